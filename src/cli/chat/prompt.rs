use rustyline::{Config, Editor, Result};

/// Prompt shown before each line; names the staged image if there is one.
pub fn generate_prompt(staged_image: Option<&str>) -> String {
    match staged_image {
        Some(name) => format!("[{}] > ", name),
        None => "> ".to_string(),
    }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)
        .build();
    Editor::with_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_staged_image() {
        assert_eq!(generate_prompt(None), "> ");
        assert_eq!(generate_prompt(Some("leaf.png")), "[leaf.png] > ");
    }
}
