mod args;
mod locale;
mod render;
mod runtime;
mod slash_command;
mod tui;

use anyhow::{anyhow, Context, Result};
use args::{
    AskCommand, ChatCommand, Cli, Command, CompletionCommand, ConfigCommand, ConfigSubcommand,
    DoctorCommand, GlobalArgs, ModelsCommand, ReviewCommand, TravelCommand,
};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use render::StreamRenderer;
use runtime::CliRuntime;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use xiaobaobao::graphql::ChatInput;
use xiaobaobao::schemas::ChatMessage;
use xiaobaobao::travel::{split_destinations, validate_request, TravelQuery, TravelRouteRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = CliRuntime::init(&cli.global)?;
    let tui_planned = matches!(cli.command, Some(Command::Chat(_)))
        || (cli.command.is_none() && cli.prompt.is_none() && io::stdin().is_terminal());
    let _log_guard = init_tracing(&runtime, tui_planned);

    match cli.command {
        Some(command) => dispatch_command(&runtime, &cli.global, command).await,
        None => run_default(&runtime, &cli.global, cli.prompt).await,
    }
}

/// TUI 模式日志落盘，避免污染备用屏幕；其余模式输出到 stderr。
fn init_tracing(
    runtime: &CliRuntime,
    tui_planned: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(runtime.config.log_level()));
    if !tui_planned {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
        return None;
    }

    let logs_dir = runtime.temp_root.join("logs");
    if fs::create_dir_all(&logs_dir).is_err() {
        return None;
    }
    let appender = tracing_appender::rolling::never(logs_dir, "xiaobaobao-cli.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}

async fn dispatch_command(
    runtime: &CliRuntime,
    global: &GlobalArgs,
    command: Command,
) -> Result<()> {
    match command {
        Command::Ask(cmd) => handle_ask(runtime, global, cmd).await,
        Command::Chat(cmd) => handle_chat(runtime, global, cmd).await,
        Command::Review(cmd) => handle_review(runtime, global, cmd).await,
        Command::Travel(cmd) => handle_travel(runtime, global, cmd).await,
        Command::Models(cmd) => handle_models(runtime, cmd).await,
        Command::Doctor(cmd) => handle_doctor(runtime, cmd).await,
        Command::Config(cmd) => handle_config(runtime, cmd),
        Command::Completion(cmd) => handle_completion(cmd),
    }
}

async fn run_default(
    runtime: &CliRuntime,
    global: &GlobalArgs,
    prompt: Option<String>,
) -> Result<()> {
    if prompt.is_some() || !io::stdin().is_terminal() {
        let prompt = resolve_prompt_text(prompt)?;
        return run_prompt_once(runtime, global, &prompt).await;
    }
    tui::run_main(runtime, global, None).await
}

async fn handle_ask(runtime: &CliRuntime, global: &GlobalArgs, command: AskCommand) -> Result<()> {
    let prompt = resolve_prompt_text(command.prompt)?;
    run_prompt_once(runtime, global, &prompt).await
}

async fn handle_chat(
    runtime: &CliRuntime,
    global: &GlobalArgs,
    command: ChatCommand,
) -> Result<()> {
    tui::run_main(runtime, global, command.prompt).await
}

/// 单轮提问：默认走流式端点，--no-stream 时走 GraphQL chat 变更。
/// 流式失败且尚未输出任何增量时，退回一次性请求。
async fn run_prompt_once(runtime: &CliRuntime, global: &GlobalArgs, prompt: &str) -> Result<()> {
    let client = runtime.streaming_client();
    let messages = vec![ChatMessage::user(prompt)];
    let mut renderer = StreamRenderer::new(global.json);

    let result = if global.no_stream {
        chat_via_graphql(runtime, &messages).await
    } else {
        let cancel = CancellationToken::new();
        let streamed = client
            .stream_chat(&messages, &cancel, |delta| renderer.delta(delta))
            .await;
        match streamed {
            Ok(reply) => Ok(reply),
            Err(err) if !renderer.saw_delta() => {
                tracing::warn!("流式请求失败，改用备用模式: {err}");
                client.complete(&messages).await
            }
            Err(err) => Err(err),
        }
    };

    match result {
        Ok(reply) => {
            renderer.finish_turn(&reply);
            Ok(())
        }
        Err(err) => {
            renderer.error(&err.to_string());
            Err(err)
        }
    }
}

async fn chat_via_graphql(
    runtime: &CliRuntime,
    messages: &[ChatMessage],
) -> Result<xiaobaobao::stream::ChatReply> {
    let chat = &runtime.config.chat;
    let input = ChatInput {
        model: Some(chat.model.clone()),
        messages: messages.to_vec(),
        max_tokens: Some(chat.max_tokens),
        temperature: Some(chat.temperature),
        top_p: Some(chat.top_p),
    };
    let response = runtime.graphql_client().chat(&input).await?;
    let content = response
        .choices
        .first()
        .map(|choice| choice.message.content.clone())
        .unwrap_or_default();
    Ok(xiaobaobao::stream::ChatReply {
        content,
        usage: response.usage,
        aborted: false,
    })
}

async fn handle_review(
    runtime: &CliRuntime,
    global: &GlobalArgs,
    command: ReviewCommand,
) -> Result<()> {
    let content = read_text_source(&command.file)?;
    if content.trim().is_empty() {
        return Err(anyhow!("合同内容为空"));
    }
    let client = runtime.contract_client();
    let mut renderer = StreamRenderer::new(global.json);
    let reviewed = client
        .review_stream(&content, command.contract_type.as_deref(), |chunk| {
            renderer.delta(chunk)
        })
        .await;
    match reviewed {
        Ok(full) => {
            renderer.finish_turn(&xiaobaobao::stream::ChatReply {
                content: full,
                usage: None,
                aborted: false,
            });
            Ok(())
        }
        Err(err) => {
            renderer.error(&err.to_string());
            Err(err)
        }
    }
}

async fn handle_travel(
    runtime: &CliRuntime,
    global: &GlobalArgs,
    command: TravelCommand,
) -> Result<()> {
    let request = TravelRouteRequest {
        destinations: split_destinations(&command.destinations),
        travel_style: command.style.map(Into::into),
        duration: command.days,
        start_location: command.from,
    };
    let problems = validate_request(&request);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("[error] {problem}");
        }
        return Err(anyhow!("旅行请求校验失败"));
    }

    let planner = runtime.travel_planner();
    if command.workflow {
        let outcome = planner.run_workflow(&request).await?;
        println!("{}", outcome.itinerary);
        if let Some(summary) = outcome.route_summary {
            println!(
                "\n目的地 {} 个，总距离 {} 公里，共 {} 天，预算 {}",
                summary.total_destinations,
                summary.total_distance,
                summary.total_duration,
                summary.estimated_budget
            );
        }
        return Ok(());
    }

    let response = planner.smart_planning(TravelQuery::Route(request)).await?;
    if global.json {
        let tool_routes: Vec<_> = response
            .tool_results
            .iter()
            .flatten()
            .map(|result| serde_json::to_value(&result.result))
            .collect::<Result<_, _>>()?;
        println!(
            "{}",
            serde_json::json!({ "content": response.content, "toolResults": tool_routes })
        );
    } else {
        println!("{}", response.content);
    }
    Ok(())
}

async fn handle_models(runtime: &CliRuntime, command: ModelsCommand) -> Result<()> {
    let models = runtime.graphql_client().models().await?;
    if command.json {
        let value: Vec<_> = models
            .iter()
            .map(|model| {
                serde_json::json!({
                    "id": model.id,
                    "object": model.object,
                    "created": model.created,
                    "owned_by": model.owned_by,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    if models.is_empty() {
        println!("(no models)");
        return Ok(());
    }
    for model in models {
        println!("{:<24} {}", model.id, model.owned_by);
    }
    Ok(())
}

/// 连通性诊断：GraphQL、流式端点与 Mastra 三项逐一体检。
async fn handle_doctor(runtime: &CliRuntime, command: DoctorCommand) -> Result<()> {
    let config = &runtime.config;
    if command.verbose {
        println!("graphql endpoint: {}", config.chat.graphql_endpoint);
        println!("stream endpoint:  {}", config.chat.stream_endpoint);
        println!("mastra base url:  {}", config.mastra.base_url);
        for problem in config.validate() {
            println!("[config] {problem}");
        }
        println!();
    }

    match runtime.graphql_client().hello().await {
        Ok(_) => println!("✅ GraphQL 接口连接正常"),
        Err(err) => println!("❌ GraphQL 接口连接失败: {err}"),
    }
    if runtime.streaming_client().check_streaming_support().await {
        println!("✅ 流式接口可用");
    } else {
        println!("❌ 流式接口不可用，将使用备用模式");
    }
    if runtime.travel_planner().check_health().await {
        println!("✅ Mastra 服务健康");
    } else {
        println!("❌ 无法连接到 Mastra 服务");
    }
    Ok(())
}

fn handle_config(runtime: &CliRuntime, command: ConfigCommand) -> Result<()> {
    match command.command {
        ConfigSubcommand::Show => {
            let info = runtime.config.app_info();
            println!("# {} v{}", info.name, info.version);
            for problem in &info.config_errors {
                println!("# [warning] {problem}");
            }
            print!(
                "{}",
                serde_yaml::to_string(&runtime.config).context("serialize config failed")?
            );
            Ok(())
        }
    }
}

fn handle_completion(command: CompletionCommand) -> Result<()> {
    let mut cmd = Cli::command();
    generate(command.shell, &mut cmd, "xiaobaobao-cli", &mut io::stdout());
    Ok(())
}

fn resolve_prompt_text(prompt: Option<String>) -> Result<String> {
    if let Some(prompt) = prompt
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != "-")
    {
        return Ok(prompt.to_string());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("read prompt from stdin failed")?;
    let cleaned = buffer.trim();
    if cleaned.is_empty() {
        return Err(anyhow!("提问内容为空"));
    }
    Ok(cleaned.to_string())
}

fn read_text_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("read contract from stdin failed")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("读取合同文件失败: {}", path.display()))
}
