//! Cross-platform emoji normalization.
//!
//! Adapters report reactions using platform-specific strings: unicode
//! characters on Discord, short names like `+1` on Slack. `normalize` maps
//! the common ones onto a fixed set of short textual keys so handlers can
//! match reactions without caring which platform they came from. Strings
//! outside the mapping pass through unchanged (identity), with Slack-style
//! `:colons:` stripped.

/// Map a platform emoji string to its normalized key.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_matches(':');
    let key = match trimmed {
        "👍" | "+1" | "thumbsup" | "thumbs_up" => "thumbs_up",
        "👎" | "-1" | "thumbsdown" | "thumbs_down" => "thumbs_down",
        "❤️" | "❤" | "heart" => "heart",
        "🔥" | "fire" => "fire",
        "🚀" | "rocket" => "rocket",
        "👀" | "eyes" => "eyes",
        "✅" | "white_check_mark" => "white_check_mark",
        "❌" | "x" => "x",
        other => other,
    };
    key.to_string()
}

/// Map a normalized key back to the Slack reaction name.
pub fn to_slack_name(normalized: &str) -> &str {
    match normalized {
        "thumbs_up" => "+1",
        "thumbs_down" => "-1",
        other => other,
    }
}

/// Map a normalized key back to a unicode emoji where one is known.
///
/// Discord's reaction endpoints take the literal unicode character.
pub fn to_unicode(normalized: &str) -> Option<&'static str> {
    match normalized {
        "thumbs_up" => Some("👍"),
        "thumbs_down" => Some("👎"),
        "heart" => Some("❤️"),
        "fire" => Some("🔥"),
        "rocket" => Some("🚀"),
        "eyes" => Some("👀"),
        "white_check_mark" => Some("✅"),
        "x" => Some("❌"),
        _ => None,
    }
}
