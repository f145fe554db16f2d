//! Prompt text for every model call the copilot makes.

use grc_core_types::{Citation, ColumnType};

#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Asks for one `{name, description, type}` entry per CSV column.
    pub fn import_analysis(&self, rows: &[String]) -> String {
        let tags = ColumnType::ALL
            .iter()
            .map(|tag| format!("- {}: {}", tag.as_str(), type_hint(*tag)))
            .collect::<Vec<_>>()
            .join("\n");
        let naming = if rows.len() > 1 {
            "The first row is a header row: use its values as the column names."
        } else {
            "There is no header row: invent a short, descriptive name for each column from its value."
        };
        format!(
            "Below is a sample of a CSV file.\n\n<csv_file>\n{rows}\n</csv_file>\n\n\
             Describe the shape of this data. For every column, in file order, produce an object \
             with these properties:\n\
             - name: the column name\n\
             - description: one short sentence saying what the column holds\n\
             - type: exactly one of the following tags\n{tags}\n\n\
             {naming}\n\n\
             Reply with a JSON array of those objects and nothing else, for example:\n\
             ```json\n[{{\"name\": \"city\", \"description\": \"City the person lives in\", \"type\": \"List\"}}]\n```",
            rows = rows.join("\n"),
        )
    }

    pub fn auto_complete(&self, input: &str) -> String {
        format!(
            "Continue the text below so that the continuation reads as if the same author wrote it. \
             Match its tone, style and subject, write at least 50 words and stop at a natural \
             break.\n\n<prompt>\n{input}\n</prompt>\n\n\
             Do not repeat the original text. Reply only with a JSON object whose `completion` \
             property holds the new text, for example:\n\
             ```json\n{{\"completion\": \"...the continuation...\"}}\n```"
        )
    }

    pub fn writing_assistant(&self, input: &str, existing_content: &str) -> String {
        format!(
            "You are a writing assistant helping a user with a writing task.\n\n\
             <prompt>\n{input}\n</prompt>\n\n\
             <existing_content>\n{existing_content}\n</existing_content>\n\n\
             If existing content is present, build on it: expand, improve or finish it. \
             Otherwise write the piece from scratch.\n\n\
             Format the answer as well-formed HTML suitable for the body of a web page \
             (headings, paragraphs, lists), with every tag closed. Reply with the HTML only."
        )
    }

    pub fn control_mapping(&self, control_text: &str, citations: &[Citation]) -> String {
        let rendered = citations
            .iter()
            .map(render_citation)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Decide which citations support the control below.\n\n\
             <control_text>\n{control_text}\n</control_text>\n\n\
             <citations>\n{rendered}\n</citations>\n\n\
             Each citation's id is in the `id` attribute of its tag. Reply only with a JSON object \
             whose `mappings` property is an array of the numeric ids of the citations that map to \
             the control, or null when none do, for example:\n\
             ```json\n{{\"mappings\": [1, 2]}}\n```"
        )
    }
}

fn type_hint(tag: ColumnType) -> &'static str {
    match tag {
        ColumnType::Text => "free text such as notes, markup, emails or phone numbers",
        ColumnType::Number => "any numeric value",
        ColumnType::Date => "dates or date-times such as 06-10-2024",
        ColumnType::List => "categorical labels such as status, category, type or country",
    }
}

pub fn render_citation(citation: &Citation) -> String {
    format!(
        "<citation id=\"{}\">{}</citation>",
        citation.id,
        citation.guidance.trim()
    )
}
