//! Deterministic topical tagging for questions and their data files.
//!
//! Tags drive both rule retrieval and rule creation, so the function must be
//! pure: identical inputs always yield an identical, order-stable set.

/// Keyword table: substring of the lower-cased question -> tag.
/// Extend by appending entries; table order determines tag order.
const KEYWORD_TAGS: &[(&str, &str)] = &[
    ("sales", "sales"),
    ("city", "city"),
    ("operating", "operating_status"),
    ("revenue", "revenue"),
    ("inventory", "inventory"),
    ("employee", "employees"),
];

const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls"];
const SCRIPT_EXTENSIONS: &[&str] = &[".py"];

/// Infer tags from the question text and the associated file reference.
pub fn infer_tags(question: &str, file_ref: &str) -> Vec<String> {
    let lower_question = question.to_lowercase();
    let mut tags: Vec<String> = Vec::new();

    if SPREADSHEET_EXTENSIONS
        .iter()
        .any(|ext| file_ref.ends_with(ext))
    {
        push_unique(&mut tags, "xlsx");
        push_unique(&mut tags, "spreadsheet");
    }
    if SCRIPT_EXTENSIONS.iter().any(|ext| file_ref.ends_with(ext)) {
        push_unique(&mut tags, "python");
    }

    for (keyword, tag) in KEYWORD_TAGS {
        if lower_question.contains(keyword) {
            push_unique(&mut tags, tag);
        }
    }

    tags
}

fn push_unique(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|existing| existing == tag) {
        tags.push(tag.to_string());
    }
}
