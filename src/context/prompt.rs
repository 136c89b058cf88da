//! Bundling of selected file contents and a question into one prompt

use super::FileRef;

/// Render files followed by the question
///
/// Each file becomes its relative path and a fenced block with its content.
pub fn build_prompt(files: &[(FileRef, String)], question: &str) -> String {
    let mut prompt = String::new();

    if !files.is_empty() {
        prompt.push_str("Here are the files of my project:\n\n");
        for (file, content) in files {
            let fence = fence_for(content);
            prompt.push_str(file.relative());
            prompt.push('\n');
            prompt.push_str(&fence);
            prompt.push('\n');
            prompt.push_str(content);
            if !content.ends_with('\n') {
                prompt.push('\n');
            }
            prompt.push_str(&fence);
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str(question.trim());
    prompt
}

// A fence longer than any backtick run in the content
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
