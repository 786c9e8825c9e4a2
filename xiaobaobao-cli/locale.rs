use crate::args::GlobalArgs;

/// CLI 语言解析：--lang 优先，其次 LANG 环境变量，默认中文。
pub fn resolve_cli_language(global: &GlobalArgs) -> String {
    if let Some(language) = global
        .language
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return language.to_string();
    }
    std::env::var("LANG")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "zh-CN".to_string())
}

pub fn is_zh_language(language: &str) -> bool {
    language.trim().to_ascii_lowercase().starts_with("zh")
}

pub fn tr<S: Into<String>>(language: &str, zh: S, en: S) -> String {
    if is_zh_language(language) {
        zh.into()
    } else {
        en.into()
    }
}
