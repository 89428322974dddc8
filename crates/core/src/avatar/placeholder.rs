//! Deterministic SVG placeholder avatars.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::user_info::UserInfo;

const SIZE: u32 = 128;

/// Up to two uppercase initials for the user.
///
/// Source name: first + last name, then display name, username, and finally
/// the user id. Multi-word names take the first letter of the first two
/// words; single words take their first two alphanumerics.
pub fn initials(user_id: &str, info: Option<&UserInfo>) -> String {
    let name = info.and_then(source_name).unwrap_or_else(|| user_id.to_string());
    let words: Vec<&str> = name.split_whitespace().collect();

    let letters: String = if words.len() >= 2 {
        words.iter().take(2).filter_map(|word| word.chars().find(|c| c.is_alphanumeric())).collect()
    } else {
        name.chars().filter(|c| c.is_alphanumeric()).take(2).collect()
    };

    if letters.is_empty() {
        "?".to_string()
    } else {
        letters.to_uppercase()
    }
}

fn source_name(info: &UserInfo) -> Option<String> {
    fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    if let (Some(first), Some(last)) = (present(&info.first_name), present(&info.last_name)) {
        return Some(format!("{first} {last}"));
    }
    present(&info.display_name)
        .or_else(|| Some(info.username.trim()).filter(|v| !v.is_empty()))
        .or_else(|| Some(info.id.trim()).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Background hue in degrees from a 32-bit rolling hash of `seed`.
pub fn hue(seed: &str) -> u32 {
    let hash = seed.chars().fold(0i32, |hash, c| {
        hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(c as i32)
    });
    hash.unsigned_abs() % 360
}

/// `data:image/svg+xml;base64,...` URL of the placeholder.
pub fn placeholder(user_id: &str, info: Option<&UserInfo>) -> String {
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#,
            r#"<rect width="{size}" height="{size}" fill="hsl({hue}, 60%, 50%)"/>"#,
            r##"<text x="50%" y="50%" dy=".1em" fill="#ffffff" font-family="Arial, sans-serif" "##,
            r#"font-size="52" text-anchor="middle" dominant-baseline="middle">{initials}</text></svg>"#,
        ),
        size = SIZE,
        hue = hue(user_id),
        initials = escape(&initials(user_id, info)),
    );
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

fn escape(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
        out
    })
}
