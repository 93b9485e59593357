use std::fmt::Write;

/// Render per-server instructions into one document.
///
/// `servers` yields `(name, instructions)` in registration order; servers with
/// empty instructions are skipped.
#[must_use]
pub fn format_mcp_instructions<'a, I>(servers: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<String>)>,
{
    let mut out = String::new();
    for (name, instructions) in servers {
        let Some(text) = instructions.filter(|t| !t.is_empty()) else {
            continue;
        };
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        let _ = write!(
            out,
            "The following are instructions provided by the tool server '{name}':\n\
             ---[start of server instructions]---\n\
             {text}\n\
             ---[end of server instructions]---",
        );
    }
    out
}
