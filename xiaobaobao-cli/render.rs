use std::io::{self, Write};
use xiaobaobao::schemas::TokenUsage;
use xiaobaobao::stream::ChatReply;

/// 一次性命令的流式输出渲染：默认边收边打，--json 时输出 JSONL 事件。
pub struct StreamRenderer {
    json: bool,
    line_open: bool,
    saw_delta: bool,
}

impl StreamRenderer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            line_open: false,
            saw_delta: false,
        }
    }

    pub fn saw_delta(&self) -> bool {
        self.saw_delta
    }

    pub fn delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.json {
            println!(
                "{}",
                serde_json::json!({ "event": "delta", "data": { "delta": text } })
            );
            self.saw_delta = true;
            return;
        }
        print!("{text}");
        io::stdout().flush().ok();
        self.line_open = true;
        self.saw_delta = true;
    }

    pub fn finish_turn(&mut self, reply: &ChatReply) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "final",
                    "data": {
                        "answer": reply.content,
                        "usage": reply.usage.map(usage_json),
                        "aborted": reply.aborted,
                    }
                })
            );
            return;
        }
        self.ensure_newline();
        if !self.saw_delta && !reply.content.is_empty() {
            println!("{}", reply.content);
        }
    }

    pub fn error(&mut self, message: &str) {
        if self.json {
            println!(
                "{}",
                serde_json::json!({ "event": "error", "data": { "message": message } })
            );
            return;
        }
        self.ensure_newline();
        eprintln!("[error] {message}");
    }

    fn ensure_newline(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

fn usage_json(usage: TokenUsage) -> serde_json::Value {
    serde_json::json!({
        "prompt_tokens": usage.prompt_tokens,
        "completion_tokens": usage.completion_tokens,
        "total_tokens": usage.total_tokens,
    })
}
