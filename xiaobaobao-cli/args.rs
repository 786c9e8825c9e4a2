use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use xiaobaobao::travel::TravelStyle;

/// 小包包命令行（xiaobaobao-cli）
///
/// If no subcommand is specified, enters TUI on TTY (or handles one-shot input).
/// 未指定子命令时，在 TTY 下进入 TUI（或处理一次性输入）。
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    bin_name = "xiaobaobao-cli",
    subcommand_negates_reqs = true,
    override_usage = "xiaobaobao-cli [OPTIONS] [PROMPT]\n       xiaobaobao-cli [OPTIONS] <COMMAND> [ARGS]\n       xiaobaobao-cli [选项] [PROMPT]\n       xiaobaobao-cli [选项] <命令> [参数]"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Initial prompt / 初始提问，留空进入 TUI/交互模式。
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Model name / 模型名称。
    #[arg(long, short = 'm', global = true)]
    pub model: Option<String>,

    /// Session id / 会话 ID。
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Conversation mode / 会话模式（聊天、合同审核、旅游规划）。
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ChatModeArg>,

    /// Output stream events as JSONL / 以 JSONL 输出流事件。
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Disable streaming output / 关闭流式输出。
    #[arg(long = "no-stream", global = true, default_value_t = false)]
    pub no_stream: bool,

    /// Language override (e.g. zh-CN / en-US) / 语言覆盖。
    #[arg(long = "lang", alias = "language", global = true)]
    pub language: Option<String>,

    /// Base config path / 基础配置路径（默认 config/xiaobaobao.yaml）。
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    /// Runtime temp root / 运行时临时目录（默认 ./XIAOBAOBAO_TEMP）。
    #[arg(long = "temp-root", global = true)]
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum ChatModeArg {
    Chat,
    Contract,
    Travel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum TravelStyleArg {
    Budget,
    Comfort,
    Luxury,
}

impl From<TravelStyleArg> for TravelStyle {
    fn from(value: TravelStyleArg) -> Self {
        match value {
            TravelStyleArg::Budget => TravelStyle::Budget,
            TravelStyleArg::Comfort => TravelStyle::Comfort,
            TravelStyleArg::Luxury => TravelStyle::Luxury,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ask one question and print the result / 单轮提问并输出结果。
    Ask(AskCommand),

    /// Start an interactive chat session / 启动交互会话。
    Chat(ChatCommand),

    /// Review a contract file for compliance / 审核合同文件合规性。
    Review(ReviewCommand),

    /// Plan a travel route / 规划旅游路线。
    Travel(TravelCommand),

    /// List models exposed by the chat API / 列出聊天接口提供的模型。
    Models(ModelsCommand),

    /// Diagnose connectivity to remote services / 诊断远端服务连通性。
    Doctor(DoctorCommand),

    /// Inspect runtime config / 查看运行配置。
    Config(ConfigCommand),

    /// Generate shell completion scripts / 生成 Shell 补全脚本。
    Completion(CompletionCommand),
}

#[derive(Debug, Args)]
pub struct AskCommand {
    /// Prompt to run / 提问内容；传 '-' 从 stdin 读取。
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,
}

#[derive(Debug, Args)]
pub struct ChatCommand {
    /// Optional first prompt / 交互会话的首条提问（可选）。
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReviewCommand {
    /// Contract file path / 合同文件路径；传 '-' 从 stdin 读取。
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Contract type label / 合同类型（可选，如 劳动、租赁）。
    #[arg(long = "contract-type")]
    pub contract_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct TravelCommand {
    /// Destinations separated by ,，、 / 目的地列表，逗号或顿号分隔。
    #[arg(value_name = "DESTINATIONS")]
    pub destinations: String,

    /// Travel style / 旅行风格。
    #[arg(long, value_enum)]
    pub style: Option<TravelStyleArg>,

    /// Trip length in days / 旅行天数。
    #[arg(long)]
    pub days: Option<u32>,

    /// Departure city / 出发地。
    #[arg(long)]
    pub from: Option<String>,

    /// Run the full planning workflow / 走完整规划工作流。
    #[arg(long, default_value_t = false)]
    pub workflow: bool,
}

#[derive(Debug, Args)]
pub struct ModelsCommand {
    /// Output as JSON / 以 JSON 输出。
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoctorCommand {
    /// Print extended diagnostics / 输出扩展诊断信息。
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show resolved runtime config / 查看解析后的运行配置。
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionCommand {
    /// Target shell / 目标 Shell。
    #[arg(value_enum, default_value_t = Shell::Bash)]
    pub shell: Shell,
}
