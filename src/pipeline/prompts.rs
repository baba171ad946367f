//! Prompt construction for the model stages.
//!
//! Every model stage sends the same tagged layout:
//!
//! ```text
//! <task>...</task>
//! <instructions>...</instructions>
//! <output_format>...</output_format>
//! <{input_tag}>...</{input_tag}>
//! ```

use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

const XML_LAYOUT: &str = "<task>\n{task}\n</task>\n\n<instructions>\n{instructions}\n</instructions>\n\n<output_format>\n{output_format}\n</output_format>\n\n<{input_tag}>\n{input}\n</{input_tag}>";

static XML_TEMPLATE: Lazy<PromptTemplate> = Lazy::new(|| PromptTemplate::new(XML_LAYOUT));

/// A prompt with `{name}` placeholders.
///
/// Substitution is single-pass: braces inside substituted values (JSON
/// payloads, code) are never re-expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names, sorted and deduplicated.
    pub fn variables(&self) -> Vec<String> {
        VARIABLE
            .captures_iter(&self.template)
            .map(|c| c[1].to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn render(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        let missing: Vec<String> = self
            .variables()
            .into_iter()
            .filter(|v| !vars.contains_key(v.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(Error::configuration_with_context(
                format!("Prompt template is missing variables: {}", missing.join(", ")),
                ErrorContext::new().with_source("prompt_template"),
            ));
        }

        Ok(VARIABLE
            .replace_all(&self.template, |c: &regex::Captures| {
                vars.get(&c[1]).copied().unwrap_or_default().to_string()
            })
            .into_owned())
    }
}

/// Tagged prompt used by every model stage.
pub fn xml_prompt(
    task: &str,
    instructions: &str,
    output_format: &str,
    input: &str,
    input_tag: &str,
) -> Result<String> {
    let vars = HashMap::from([
        ("task", task),
        ("instructions", instructions),
        ("output_format", output_format),
        ("input", input),
        ("input_tag", input_tag),
    ]);
    XML_TEMPLATE.render(&vars)
}

pub fn system_prompt(role: &str, instructions: &str) -> String {
    format!(
        "You are a {}.\n\n{}\n\nAlways provide accurate, well-structured responses based on the input provided.",
        role, instructions
    )
}

/// System prompt pinning the response language to the transcript's.
pub fn language_system_prompt(language_code: &str) -> Option<String> {
    let code = language_code.trim();
    if code.is_empty() {
        return None;
    }
    Some(system_prompt(
        "Technical Documentation Specialist",
        &format!(
            "The source recording is in {}. Write every response in that language, keeping commands, code and error messages verbatim.",
            code
        ),
    ))
}

/// Content between the first `<tag>` and `</tag>`, trimmed.
pub fn extract_xml_content(response: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;
    re.captures(response).map(|c| c[1].trim().to_string())
}

const JSON_ONLY: &str =
    "Respond ONLY with valid JSON. Do not use Markdown or XML tags in the response.";

/// Stage 2: technical content extraction from the timestamped transcript.
pub fn technical_extraction(transcript: &str) -> Result<String> {
    xml_prompt(
        "You are a Software Technical Documentation Specialist. Analyze the transcript and extract its technical content as JSON.",
        r#"Ignore social conversation. Focus exclusively on technical content.

Produce a JSON object with the following keys:

1. "diagnostics": list of objects, each with:
   - "error_code": error code or message.
   - "root_cause": the explained cause.

2. "solutions": list of strings describing technical steps, commands and configurations performed.

3. "risks": list of strings warning about concurrency, shared environments or side effects.

4. "business_rules": list of strings explaining the system's behavior (the "why").

5. "configurations": list of naming conventions, prefixes and tool settings."#,
        JSON_ONLY,
        transcript,
        "transcription",
    )
}

/// Stage 3: problem to solution mapping over the stage 2 payload.
pub fn solution_mapping(technical_content: &Value) -> Result<String> {
    let input = serde_json::to_string_pretty(technical_content)?;
    xml_prompt(
        "You are a Senior Software Engineer. Build a hierarchical mapping between problems and solutions.",
        r#"Based on the technical content, produce a JSON object with the following keys:

1. "problem_solution_map": list of objects containing:
   - "problem": error code or message
   - "root_cause": technical root cause
   - "solution_steps": list of steps performed
   - "commands": list of commands used
   - "outcome": result obtained

2. "preventive_measures": list of strings on how to avoid the problem in the future.

3. "debugging_steps": list of strings on how to diagnose or investigate the problem."#,
        JSON_ONLY,
        &input,
        "technical_content",
    )
}

/// Stage 4: outline only.
pub fn document_outline(solution_map: &Value) -> Result<String> {
    let input = serde_json::to_string_pretty(solution_map)?;
    xml_prompt(
        "You are a Technical Instructional Designer. Create the structure for a Training and Troubleshooting Guide.",
        r#"Organize the topics considering:

1. Troubleshooting (Error -> Solution)
2. Practical Procedures (Step by step, Debugging)
3. Safety Protocols (Shared environment)
4. Business Rules (Understanding the system)
5. FAQ

<CRITICAL_CONSTRAINT>
Produce ONLY THE STRUCTURE (Outline) with headings and descriptive bullet points of what will be covered.
DO NOT WRITE THE PARAGRAPH CONTENT YET.
DO NOT GENERATE EXAMPLE CODE YET.
The goal is an organized skeleton for approval.
</CRITICAL_CONSTRAINT>"#,
        "Markdown Outline (heading hierarchy #, ## and - lists)",
        &input,
        "solution_map",
    )
}

/// Stage 5: the full document, expanded from the outline.
pub fn content_writing(outline: &str) -> Result<String> {
    xml_prompt(
        "Act as a Senior Technical Writer. Write a complete Training and Troubleshooting Document in Markdown.",
        r#"<guidelines>
- Tone: professional, instructional, direct (imperative: 'Do', 'Configure', 'Check')
- Clarity: accessible to beginners. Explain the 'why', not only the 'how'
- Formatting: use code blocks, bold for emphasis, blockquotes for critical warnings
- Completeness: you have a large output capacity. Do not summarize. Write every technical detail needed.
</guidelines>

<required_structure>
Follow the provided outline strictly, expanding each point into detailed technical paragraphs.
Include:
1. Introduction
2. Body (Concepts, Troubleshooting, Procedures, Best Practices, Safety)
3. Closing
4. FAQ
</required_structure>

<quality_checklist>
- Objective, didactic text
- Clear section headings
- Only relevant information
- No offensive terms or inside jokes
</quality_checklist>"#,
        "Generate the complete Markdown document NOW.",
        outline,
        "document_outline",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_xml_prompt_layout() {
        let prompt = xml_prompt("T", "I", "O", "data", "transcription").unwrap();
        assert_eq!(
            prompt,
            "<task>\nT\n</task>\n\n<instructions>\nI\n</instructions>\n\n<output_format>\nO\n</output_format>\n\n<transcription>\ndata\n</transcription>"
        );
    }

    #[test]
    fn test_values_with_braces_are_not_expanded() {
        let prompt = xml_prompt("T", "I", "O", r#"{"task": "{task}"}"#, "input").unwrap();
        assert!(prompt.contains(r#"<input>
{"task": "{task}"}
</input>"#));
    }

    #[test]
    fn test_template_variables_and_missing() {
        let template = PromptTemplate::new("Hi {name}, see {doc} and {name}");
        assert_eq!(template.variables(), vec!["doc", "name"]);

        let vars = HashMap::from([("name", "Ana"), ("doc", "guide")]);
        assert_eq!(template.render(&vars).unwrap(), "Hi Ana, see guide and Ana");

        let err = template.render(&HashMap::from([("name", "Ana")])).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("doc"));
    }

    #[test]
    fn test_stage_prompts_carry_their_keys() {
        let p2 = technical_extraction("[00:00:01] spk_0: hello").unwrap();
        for key in ["diagnostics", "error_code", "root_cause", "solutions", "risks", "business_rules", "configurations"] {
            assert!(p2.contains(key), "{key}");
        }
        assert!(p2.contains("<transcription>\n[00:00:01] spk_0: hello\n</transcription>"));

        let p3 = solution_mapping(&json!({"solutions": ["x"]})).unwrap();
        for key in ["problem_solution_map", "solution_steps", "commands", "outcome", "preventive_measures", "debugging_steps"] {
            assert!(p3.contains(key), "{key}");
        }
        assert!(p3.contains("<technical_content>"));

        let p4 = document_outline(&json!({})).unwrap();
        assert!(p4.contains("CRITICAL_CONSTRAINT"));
        assert!(p4.contains("<solution_map>\n{}\n</solution_map>"));

        let p5 = content_writing("# Outline").unwrap();
        assert!(p5.contains("<document_outline>\n# Outline\n</document_outline>"));
    }

    #[test]
    fn test_extract_xml_content() {
        let text = "pre <answer>\n 42 \n</answer> post <answer>x</answer>";
        assert_eq!(extract_xml_content(text, "answer").as_deref(), Some("42"));
        assert_eq!(extract_xml_content(text, "missing"), None);
    }

    #[test]
    fn test_language_system_prompt() {
        assert!(language_system_prompt("").is_none());
        let sys = language_system_prompt("pt-BR").unwrap();
        assert!(sys.starts_with("You are a Technical Documentation Specialist."));
        assert!(sys.contains("pt-BR"));
    }
}
