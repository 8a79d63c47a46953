//! LLM prompts for PageIndex operations.
//!
//! Templates use `{name}` placeholders filled with `str::replace`.

/// Collection of prompts used by the structuring pipeline.
pub struct Prompts;

impl Prompts {
    /// Prompt to detect if a page contains a table of contents.
    pub fn toc_detector() -> &'static str {
        r#"Your job is to detect if there is a table of content provided in the given text.

Given text: {content}

return the following JSON format:
{
    "thinking": <why do you think there is a table of content in the given text>
    "toc_detected": "<yes or no>",
}

Directly return the final JSON structure. Do not output anything else.
Please note: abstract, summary, notation list, figure list, table list, etc. are not table of contents."#
    }

    /// Prompt to transform raw TOC into structured JSON.
    pub fn toc_transformer() -> &'static str {
        r#"You are given a table of contents, You job is to transform the whole table of content into a JSON format included table_of_contents.

structure is the numeric system which represents the index of the hierarchy section in the table of contents. For example, the first section has structure index 1, the first subsection has structure index 1.1, the second subsection has structure index 1.2, etc.

The response should be in the following JSON format:
{
"table_of_contents": [
    {
        "structure": <structure index, "x.x.x" or None> (string),
        "title": <title of the section>,
        "page": <page number or None>,
    },
    ...
    ],
}
You should transform the full table of contents in one go.
Directly return the final JSON structure, do not output anything else.

Given table of contents:
{toc_content}"#
    }

    /// Prompt to generate initial tree structure from document text.
    pub fn generate_toc_init() -> &'static str {
        r#"You are an expert in extracting hierarchical tree structure, your task is to generate the tree structure of the document.

The structure variable is the numeric system which represents the index of the hierarchy section in the table of contents. For example, the first section has structure index 1, the first subsection has structure index 1.1, the second subsection has structure index 1.2, etc.

For the title, you need to extract the original title from the text, only fix the space inconsistency.

The provided text contains tags like <physical_index_X> and <physical_index_X> to indicate the start and end of page X.

For the physical_index, you need to extract the physical index of the start of the section from the text. Keep the <physical_index_X> format.

The response should be in the following format:
    [
        {
            "structure": <structure index, "x.x.x"> (string),
            "title": <title of the section, keep the original title>,
            "physical_index": "<physical_index_X> (keep the format)"
        },

    ],


Directly return the final JSON structure. Do not output anything else.

Given text:
{content}"#
    }

    /// Prompt to continue generating tree structure from additional document parts.
    pub fn generate_toc_continue() -> &'static str {
        r#"You are an expert in extracting hierarchical tree structure.
You are given a tree structure of the previous part and the text of the current part.
Your task is to continue the tree structure from the previous part to include the current part.

The structure variable is the numeric system which represents the index of the hierarchy section in the table of contents. For example, the first section has structure index 1, the first subsection has structure index 1.1, the second subsection has structure index 1.2, etc.

For the title, you need to extract the original title from the text, only fix the space inconsistency.

The provided text contains tags like <physical_index_X> and <physical_index_X> to indicate the start and end of page X.

For the physical_index, you need to extract the physical index of the start of the section from the text. Keep the <physical_index_X> format.

The response should be in the following format.
    [
        {
            "structure": <structure index, "x.x.x"> (string),
            "title": <title of the section, keep the original title>,
            "physical_index": "<physical_index_X> (keep the format)"
        },
        ...
    ]

Directly return the additional part of the final JSON structure. Do not output anything else.

Given text:
{content}

Previous tree structure:
{previous}"#
    }

    /// Prompt to find the start page of one TOC item within a window of pages.
    pub fn toc_index_fixer() -> &'static str {
        r#"You are given a section title and several pages of a document, your job is to find the physical index of the start page of the section in the partial document.

The provided pages contains tags like <physical_index_X> and <physical_index_X> to indicate the physical location of the page X.

Reply in a JSON format:
{
    "thinking": <explain which page, started and closed by <physical_index_X>, contains the start of this section>,
    "physical_index": "<physical_index_X>" (keep the format)
}
Directly return the final JSON structure. Do not output anything else.

Section Title:
{title}

Document pages:
{content}"#
    }

    /// Prompt to generate a summary for a document section.
    pub fn generate_node_summary() -> &'static str {
        r#"You are given a section from a document. Generate a concise summary (2-3 sentences) describing the main topics and key information covered in this section.

Section Title: {title}

Section Content:
{content}

Provide ONLY the summary text, nothing else. Be specific about what information this section contains that would help someone searching for relevant content."#
    }

    /// Prompt to describe a whole document from its outline.
    pub fn generate_doc_description() -> &'static str {
        r#"Your are an expert in generating descriptions for a document.
You are given a structure of a document. Your task is to generate a one-sentence description for the document, which makes it easy to distinguish the document from other documents.

Document Structure:
{structure}

Directly return the description, do not include any other text."#
    }

    /// System prompt for general document analysis.
    pub fn system_document_analyzer() -> &'static str {
        "You are an expert document analyzer. You help extract structure, navigate content, and answer questions about documents. Always respond with valid JSON when requested."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::toc_detector().is_empty());
        assert!(!Prompts::toc_transformer().is_empty());
        assert!(!Prompts::generate_toc_init().is_empty());
        assert!(!Prompts::generate_toc_continue().is_empty());
        assert!(!Prompts::toc_index_fixer().is_empty());
        assert!(!Prompts::generate_node_summary().is_empty());
        assert!(!Prompts::generate_doc_description().is_empty());
    }

    #[test]
    fn test_placeholders_present() {
        assert!(Prompts::toc_detector().contains("{content}"));
        assert!(Prompts::toc_transformer().contains("{toc_content}"));
        assert!(Prompts::generate_toc_continue().contains("{previous}"));
        assert!(Prompts::toc_index_fixer().contains("{title}"));
        assert!(Prompts::generate_doc_description().contains("{structure}"));
    }
}
