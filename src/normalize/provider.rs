//! Provider detection from a page host

/// Known chat hosts and the provider names they map to
const KNOWN_PROVIDERS: &[(&[&str], &str)] = &[
    (&["chatgpt.com", "openai.com"], "ChatGPT"),
    (&["claude.ai"], "Claude"),
    (&["gemini.google.com"], "Gemini"),
    (&["aistudio.google.com"], "AI Studio"),
    (&["mistral.ai"], "Mistral"),
    (&["perplexity.ai"], "Perplexity"),
    (&["deepseek.com"], "DeepSeek"),
];

/// Provider names excluded from tag suggestions
pub const PROVIDER_WORDS: &[&str] = &[
    "chatgpt",
    "openai",
    "claude",
    "gemini",
    "mistral",
    "perplexity",
    "deepseek",
    "studio",
];

/// Maps a host name to a provider display name
///
/// Unknown hosts use their second-to-last label, capitalized. A single-label
/// host is returned unchanged and an empty host yields `"Web"`.
///
/// # Examples
///
/// ```
/// use agregllm::normalize::detect_provider;
///
/// assert_eq!(detect_provider("chatgpt.com"), "ChatGPT");
/// assert_eq!(detect_provider("chat.example.org"), "Example");
/// assert_eq!(detect_provider("localhost"), "localhost");
/// ```
pub fn detect_provider(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() {
        return "Web".to_string();
    }

    for (patterns, name) in KNOWN_PROVIDERS {
        if patterns.iter().any(|p| host.contains(p)) {
            return (*name).to_string();
        }
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host;
    }
    capitalize(labels[labels.len() - 2])
}

/// Host of a page url, if it has one
pub fn host_from_url(page_url: &str) -> Option<String> {
    url::Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
