//! The OpenAI-compatible vendor table.
//!
//! These vendors speak the Chat Completions wire format and differ only in
//! base URL, default model, and whether they run on localhost (which
//! changes how credentials are validated).

use crate::client::OpenAi;

/// One OpenAI-compatible vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatVendor {
    /// Stable vendor id (e.g. `"groq"`).
    pub id: &'static str,
    /// Display name.
    pub display_name: &'static str,
    /// Chat Completions base URL (includes the version segment).
    pub base_url: &'static str,
    /// Model used when the request does not name one.
    pub default_model: &'static str,
    /// Whether the vendor runs on the user's machine (no API key needed;
    /// credential validation probes the server instead).
    pub is_local: bool,
}

/// Every known OpenAI-compatible vendor.
pub const VENDORS: &[CompatVendor] = &[
    CompatVendor {
        id: "ollama",
        display_name: "Ollama",
        base_url: "http://localhost:11434/v1",
        default_model: "llama3.2",
        is_local: true,
    },
    CompatVendor {
        id: "lmstudio",
        display_name: "LM Studio",
        base_url: "http://localhost:1234/v1",
        default_model: "local-model",
        is_local: true,
    },
    CompatVendor {
        id: "groq",
        display_name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        is_local: false,
    },
    CompatVendor {
        id: "mistral",
        display_name: "Mistral",
        base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-large-latest",
        is_local: false,
    },
    CompatVendor {
        id: "moonshot",
        display_name: "Moonshot",
        base_url: "https://api.moonshot.cn/v1",
        default_model: "moonshot-v1-32k",
        is_local: false,
    },
    CompatVendor {
        id: "deepseek",
        display_name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        is_local: false,
    },
    CompatVendor {
        id: "xai",
        display_name: "xAI",
        base_url: "https://api.x.ai/v1",
        default_model: "grok-3",
        is_local: false,
    },
    CompatVendor {
        id: "openrouter",
        display_name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "openrouter/auto",
        is_local: false,
    },
    CompatVendor {
        id: "qwen",
        display_name: "Qwen",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        default_model: "qwen-plus",
        is_local: false,
    },
    CompatVendor {
        id: "zhipu",
        display_name: "Zhipu",
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        default_model: "glm-4-plus",
        is_local: false,
    },
    CompatVendor {
        id: "yi",
        display_name: "Yi",
        base_url: "https://api.lingyiwanwu.com/v1",
        default_model: "yi-lightning",
        is_local: false,
    },
    CompatVendor {
        id: "baichuan",
        display_name: "Baichuan",
        base_url: "https://api.baichuan-ai.com/v1",
        default_model: "Baichuan4",
        is_local: false,
    },
    CompatVendor {
        id: "doubao",
        display_name: "Doubao",
        base_url: "https://ark.cn-beijing.volces.com/api/v3",
        default_model: "doubao-pro-32k",
        is_local: false,
    },
    CompatVendor {
        id: "minimax",
        display_name: "Minimax",
        base_url: "https://api.minimax.chat/v1",
        default_model: "MiniMax-Text-01",
        is_local: false,
    },
];

/// Look up a vendor by id, case-insensitively.
#[must_use]
pub fn vendor(id: &str) -> Option<&'static CompatVendor> {
    VENDORS.iter().find(|v| v.id.eq_ignore_ascii_case(id))
}

impl OpenAi {
    /// Build a client for an OpenAI-compatible vendor.
    ///
    /// Local vendors accept an empty API key.
    #[must_use]
    pub fn for_vendor(vendor: &CompatVendor, api_key: impl Into<String>) -> Self {
        OpenAi::new(api_key)
            .vendor_id(vendor.id)
            .base_url(vendor.base_url)
            .model(vendor.default_model)
            .local(vendor.is_local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_lookup_is_case_insensitive() {
        assert_eq!(vendor("Groq").map(|v| v.id), Some("groq"));
        assert_eq!(vendor("OLLAMA").map(|v| v.id), Some("ollama"));
        assert!(vendor("unknown").is_none());
    }

    #[test]
    fn table_covers_the_documented_family() {
        let expected = [
            "ollama", "lmstudio", "groq", "mistral", "moonshot", "deepseek", "xai",
            "openrouter", "qwen", "zhipu", "yi", "baichuan", "doubao", "minimax",
        ];
        for id in expected {
            assert!(vendor(id).is_some(), "missing vendor: {id}");
        }
        assert_eq!(VENDORS.len(), expected.len());
    }

    #[test]
    fn only_localhost_vendors_are_local() {
        for v in VENDORS {
            assert_eq!(v.is_local, v.base_url.contains("localhost"), "{}", v.id);
        }
    }
}
