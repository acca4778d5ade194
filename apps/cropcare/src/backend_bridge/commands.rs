//! Session commands queued from the input loop to the backend worker.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SelectImage { path: PathBuf },
    ClearImage,
    Submit,
    RequestTreatment,
    CheckStatus,
    SetLocale { locale: String },
    Show,
    Quit,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectImage { .. } => "select_image",
            Self::ClearImage => "clear_image",
            Self::Submit => "submit",
            Self::RequestTreatment => "request_treatment",
            Self::CheckStatus => "check_status",
            Self::SetLocale { .. } => "set_locale",
            Self::Show => "show",
            Self::Quit => "quit",
        }
    }

    /// Parses one input line. `Ok(None)` means a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let cmd = match verb.to_ascii_lowercase().as_str() {
            "select" | "open" => {
                if rest.is_empty() {
                    return Err("usage: select <path>".to_string());
                }
                Self::SelectImage {
                    path: PathBuf::from(rest),
                }
            }
            "clear" | "delete" | "retry" => Self::ClearImage,
            "submit" | "analyze" => Self::Submit,
            "treat" | "treatment" => Self::RequestTreatment,
            "status" => Self::CheckStatus,
            "locale" | "lang" => {
                if rest.is_empty() {
                    return Err("usage: locale <code>".to_string());
                }
                Self::SetLocale {
                    locale: rest.to_string(),
                }
            }
            "show" => Self::Show,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'; try: {HELP}")),
        };
        Ok(Some(cmd))
    }
}

pub const HELP: &str =
    "select <path>, clear, submit, treat, status, locale <code>, show, quit";
