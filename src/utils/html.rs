// src/utils/html.rs

/// Strips dangerous markup from author-supplied text (course descriptions, quiz and
/// question text, free-text answers) while keeping harmless formatting tags such as <b> or <p>.
///
/// `<script>` elements are removed together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

pub fn clean_optional(input: Option<String>) -> Option<String> {
    input.map(|s| clean_html(&s))
}
