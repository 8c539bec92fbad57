use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Get the path to the prompts directory
fn prompts_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("src").join("prompts")
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    // if the template_file doesn't exist, try to load it from the prompts directory
    let file_path = if !template_path.exists() {
        prompts_dir().join(template_path)
    } else {
        template_path
    };

    let template_content = fs::read_to_string(file_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

/// Render the agent's system prompt, from `template_file` when given or the built-in
/// template otherwise. Templates see the registered tools as `tools`.
pub fn system_prompt(
    tools: &[Tool],
    template_file: Option<&Path>,
) -> Result<String, TeraError> {
    let mut context = HashMap::new();
    context.insert("tools", tools);
    match template_file {
        Some(path) => load_prompt_file(path, &context),
        None => load_prompt(SYSTEM_TEMPLATE, &context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_load_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        let result = load_prompt(template, &context);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_prompt_file() {
        let template_content = "Hello, {{ name }}!";
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test_template.txt");
        fs::write(&file_path, template_content).unwrap();

        let mut context = HashMap::new();
        context.insert("name".to_string(), "Bob".to_string());

        let result = load_prompt_file(file_path, &context).unwrap();
        assert_eq!(result, "Hello, Bob!");

        temp_dir.close().unwrap();
    }

    #[test]
    fn test_load_prompt_file_missing_file() {
        let file_path = PathBuf::from("non_existent_template.txt");
        let context: HashMap<String, String> = HashMap::new();

        let result = load_prompt_file(file_path, &context);
        assert!(result.is_err());
    }

    fn dudraw_tools() -> Vec<Tool> {
        vec![
            Tool::new(
                "retrieve_dudraw_functions",
                "Retrieve relevant DuDraw function information",
                json!({"type": "object"}),
            ),
            Tool::new(
                "calculate_expression",
                "Calculates the result of a mathematical expression",
                json!({"type": "object"}),
            ),
        ]
    }

    #[test]
    fn test_builtin_system_prompt_lists_tools() {
        let prompt = system_prompt(&dudraw_tools(), None).unwrap();
        assert!(prompt.starts_with("You are an expert Python programmer and DuDraw code generator"));
        assert!(prompt.contains(
            "- `retrieve_dudraw_functions`: Retrieve relevant DuDraw function information"
        ));
        assert!(prompt.contains(
            "- `calculate_expression`: Calculates the result of a mathematical expression"
        ));
        assert!(prompt.contains("**Explanation:**"));
        assert!(prompt.contains("`initialize_game`"));
    }

    #[test]
    fn test_custom_system_prompt_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("system.md");
        fs::write(
            &file_path,
            "Tools:{% for tool in tools %} {{ tool.name }}{% endfor %}",
        )
        .unwrap();

        let prompt = system_prompt(&dudraw_tools(), Some(file_path.as_path())).unwrap();
        assert_eq!(
            prompt,
            "Tools: retrieve_dudraw_functions calculate_expression"
        );
    }
}
