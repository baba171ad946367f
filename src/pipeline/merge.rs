/// Concatenate per-chunk outlines under one `## Part N` heading each.
///
/// Only the outlines are merged; the structured stage 2 and 3 payloads of the
/// individual chunks do not reach the writing stage.
pub fn merge_outlines<S: AsRef<str>>(outlines: &[S]) -> String {
    let mut merged = String::from("# Merged Outline from Multiple Chunks\n\n");
    for (i, outline) in outlines.iter().enumerate() {
        merged.push_str(&format!("## Part {}\n\n{}\n\n", i + 1, outline.as_ref()));
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_in_order_under_part_headings() {
        let merged = merge_outlines(&["# A\n- a", "# B"]);
        assert_eq!(
            merged,
            "# Merged Outline from Multiple Chunks\n\n## Part 1\n\n# A\n- a\n\n## Part 2\n\n# B\n\n"
        );
    }

    #[test]
    fn test_empty_input_keeps_header() {
        let none: [&str; 0] = [];
        assert_eq!(merge_outlines(&none), "# Merged Outline from Multiple Chunks\n\n");
    }
}
