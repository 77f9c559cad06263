//! Caption text

/// Fields a caption can draw on
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptionInput<'a> {
    pub character_name: &'a str,
    pub series_name: &'a str,
    pub about: Option<&'a str>,
}

/// Turns a character into post text
pub trait CaptionWriter: Send + Sync {
    fn caption(&self, input: &CaptionInput<'_>) -> String;
}

/// Longest biography excerpt included in a caption, in characters
const ABOUT_EXCERPT_CHARS: usize = 180;

/// Fixed template: greeting, series, short biography excerpt, hashtags
#[derive(Debug, Clone, Default)]
pub struct TemplateCaption {
    hashtags: Vec<String>,
}

impl TemplateCaption {
    pub fn new(hashtags: Vec<String>) -> Self {
        Self { hashtags }
    }
}

impl CaptionWriter for TemplateCaption {
    fn caption(&self, input: &CaptionInput<'_>) -> String {
        let mut text = format!("Happy birthday, {}!", input.character_name);
        if !input.series_name.trim().is_empty() {
            text.push_str(&format!(" ({})", input.series_name.trim()));
        }

        if let Some(excerpt) = input.about.and_then(excerpt) {
            text.push_str("\n\n");
            text.push_str(&excerpt);
        }

        let mut tags: Vec<String> = self.hashtags.clone();
        let name_tag = hashtag(input.character_name);
        if name_tag.len() > 1 && !tags.contains(&name_tag) {
            tags.push(name_tag);
        }
        if !tags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&tags.join(" "));
        }

        text
    }
}

/// First paragraph, cut at a sentence end or a word boundary
fn excerpt(about: &str) -> Option<String> {
    let first = about.lines().map(str::trim).find(|l| !l.is_empty())?;
    if first.chars().count() <= ABOUT_EXCERPT_CHARS {
        return Some(first.to_string());
    }

    let cut: String = first.chars().take(ABOUT_EXCERPT_CHARS).collect();
    if let Some(end) = cut.rfind(". ") {
        return Some(cut[..=end].to_string());
    }
    let end = cut.rfind(' ').unwrap_or(cut.len());
    Some(format!("{}…", cut[..end].trim_end()))
}

fn hashtag(name: &str) -> String {
    let body: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
    format!("#{}", body)
}
