/// Returns the first line of `text` containing `keyword` (case-insensitive), trimmed.
/// Falls back to the untrimmed first line, which is empty for empty input.
pub fn extract_summary(text: &str, keyword: &str) -> String {
  let needle = keyword.to_lowercase();
  text
    .split('\n')
    .find(|line| line.to_lowercase().contains(&needle))
    .map(|line| line.trim().to_string())
    .unwrap_or_else(|| text.split('\n').next().unwrap_or_default().to_string())
}
