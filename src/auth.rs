//! OAuth providers handled by the proxy binary.
//!
//! The proxy performs the login flows itself; this module only knows which
//! flag starts each flow and how to recognise the token files it leaves in
//! the auth directory.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Gemini,
    Claude,
    Codex,
    Qwen,
    Iflow,
    Antigravity,
    Kiro,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 7] = [
        Self::Gemini,
        Self::Claude,
        Self::Codex,
        Self::Qwen,
        Self::Iflow,
        Self::Antigravity,
        Self::Kiro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Qwen => "qwen",
            Self::Iflow => "iflow",
            Self::Antigravity => "antigravity",
            Self::Kiro => "kiro",
        }
    }

    /// CLI flag that starts this provider's login flow.
    pub fn login_flag(&self) -> &'static str {
        match self {
            Self::Gemini => "--login",
            Self::Claude => "--claude-login",
            Self::Codex => "--codex-login",
            Self::Qwen => "--qwen-login",
            Self::Iflow => "--iflow-login",
            Self::Antigravity => "--antigravity-login",
            Self::Kiro => "--kiro-login",
        }
    }

    /// Guess the upstream family from a model id.
    pub fn from_model(model: &str) -> Option<Self> {
        static FAMILIES: LazyLock<Vec<(Regex, OAuthProvider)>> = LazyLock::new(|| {
            [
                (r"^gemini", OAuthProvider::Gemini),
                (r"^claude", OAuthProvider::Claude),
                (r"^(gpt|o[134]\b|o[134]-|codex)", OAuthProvider::Codex),
                (r"^qwen", OAuthProvider::Qwen),
                (r"^(glm|kimi|deepseek)", OAuthProvider::Iflow),
            ]
            .into_iter()
            .map(|(pattern, provider)| (Regex::new(pattern).unwrap(), provider))
            .collect()
        });

        let id = model.rsplit('/').next().unwrap_or(model).to_ascii_lowercase();
        FAMILIES
            .iter()
            .find(|(re, _)| re.is_match(&id))
            .map(|(_, provider)| *provider)
    }

    fn owns_token(&self, file_name: &str, token_type: Option<&str>) -> bool {
        if token_type.is_some_and(|t| t.eq_ignore_ascii_case(self.as_str())) {
            return true;
        }
        file_name
            .to_ascii_lowercase()
            .starts_with(&format!("{}-", self.as_str()))
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// Which providers have at least one token file in `auth_dir`.
pub fn auth_status(auth_dir: &Path) -> BTreeMap<OAuthProvider, bool> {
    let mut status: BTreeMap<OAuthProvider, bool> =
        OAuthProvider::ALL.into_iter().map(|p| (p, false)).collect();

    let Ok(entries) = std::fs::read_dir(auth_dir) else {
        return status;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let token_type = std::fs::read_to_string(&path)
            .ok()
            .and_then(|c| serde_json::from_str::<serde_json::Value>(&c).ok())
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string));

        for provider in OAuthProvider::ALL {
            if provider.owns_token(&file_name, token_type.as_deref()) {
                status.insert(provider, true);
            }
        }
    }

    status
}
