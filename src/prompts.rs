//! Prompts for chunk-by-chunk generation.
//!
//! Every prompt lives here so that wording changes touch one file and unit
//! tests can inspect prompts without a model. Callers can replace the base
//! instructions via [`crate::config::PipelineConfig::instructions`]; the
//! position rules and the chunk framing are always added.

use crate::config::PipelineConfig;
use crate::pipeline::combine::WrapperConvention;
use crate::pipeline::segment::Chunk;

/// Default base instructions placed at the top of every chunk prompt.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are an expert instructional designer. Turn the administrative message content below into a clear, well-structured study document.

Follow these rules precisely:

1. CONTENT
   - Preserve every requirement, date, deadline and reference
   - Keep the paragraph numbering of the source message
   - Do not invent policy that is not in the source

2. STRUCTURE
   - Output HTML only; no Markdown, no code fences, no commentary
   - Use <section> per numbered paragraph and <ul>/<ol> for lettered sub-paragraphs
   - Put the message title and header block inside a single <header> element"#;

/// System prompt sent with every request by [`crate::pipeline::generate::LlmGenerator`].
pub fn system_prompt(content_type: &str) -> String {
    format!(
        "You generate {content_type} documents from long administrative messages that \
arrive in several chunks. Follow the chunk position rules exactly: the wrapper and the \
title appear once in the final document, never once per chunk."
    )
}

/// Where a chunk sits in its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPosition {
    Only,
    First,
    Middle,
    Last,
}

impl ChunkPosition {
    pub fn of(chunk: &Chunk) -> Self {
        match (chunk.is_first(), chunk.is_last()) {
            (true, true) => ChunkPosition::Only,
            (true, false) => ChunkPosition::First,
            (false, true) => ChunkPosition::Last,
            (false, false) => ChunkPosition::Middle,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ChunkPosition::Only => "the ONLY chunk",
            ChunkPosition::First => "the FIRST chunk",
            ChunkPosition::Middle => "a MIDDLE chunk",
            ChunkPosition::Last => "the LAST chunk",
        }
    }
}

/// Structure rules for a chunk at `position`.
pub fn position_rules(position: ChunkPosition, wrapper: &WrapperConvention) -> String {
    let open = &wrapper.open_literal;
    let close = &wrapper.close_literal;
    match position {
        ChunkPosition::Only => format!(
            "- Produce the complete document: start with {open}, then the title/header block, \
then the content, and end with {close}."
        ),
        ChunkPosition::First => format!(
            "- Start the output with {open} followed by the title/header block.\n\
- Do NOT emit the closing {close}; later chunks continue the document."
        ),
        ChunkPosition::Middle => format!(
            "- Do NOT emit {open} or {close}.\n\
- Do NOT emit a title or header block; continue directly with content."
        ),
        ChunkPosition::Last => format!(
            "- Do NOT emit {open} or a title/header block.\n\
- End the output with the closing {close}."
        ),
    }
}

/// Build the full prompt for `chunk`.
///
/// ## Layout
///
/// 1. Base instructions (configured or [`DEFAULT_INSTRUCTIONS`])
/// 2. Chunk framing: `CHUNK i OF n`, position, position rules
/// 3. Previous-chunk context (not for the first chunk)
/// 4. The chunk content, overlap included
pub fn chunk_prompt(chunk: &Chunk, config: &PipelineConfig) -> String {
    let base = config.instructions.as_deref().unwrap_or(DEFAULT_INSTRUCTIONS);
    let position = ChunkPosition::of(chunk);

    let mut prompt = String::with_capacity(base.len() + chunk.content.len() + 1024);
    prompt.push_str(base);
    prompt.push_str(&format!(
        "\n\nCHUNK {} OF {} ({}).\n",
        chunk.index + 1,
        chunk.total,
        position.label()
    ));
    prompt.push_str(&position_rules(position, &config.wrapper));
    prompt.push_str("\n- Never repeat header or title content that a previous chunk already produced.");

    if !chunk.is_first() {
        if !chunk.overlap().is_empty() {
            prompt.push_str(
                "\n- The content starts with a short overlap from the previous chunk. \
Use it for continuity only; do not generate output for it again.",
            );
        }
        if let Some(ctx) = chunk.context.as_deref() {
            prompt.push_str("\n\n");
            prompt.push_str(ctx);
        }
    }

    prompt.push_str("\n\nCONTENT:\n\"\"\"\n");
    prompt.push_str(&chunk.content);
    prompt.push_str("\n\"\"\"");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, total: usize, context: Option<&str>) -> Chunk {
        Chunk {
            index,
            total,
            content: "tail words\n2. Second paragraph.\n".into(),
            core_offset: if index == 0 { 0 } else { 11 },
            context: context.map(str::to_string),
        }
    }

    #[test]
    fn position_of_chunks() {
        assert_eq!(ChunkPosition::of(&chunk(0, 1, None)), ChunkPosition::Only);
        assert_eq!(ChunkPosition::of(&chunk(0, 3, None)), ChunkPosition::First);
        assert_eq!(ChunkPosition::of(&chunk(1, 3, None)), ChunkPosition::Middle);
        assert_eq!(ChunkPosition::of(&chunk(2, 3, None)), ChunkPosition::Last);
    }

    #[test]
    fn first_chunk_prompt_has_opening_only() {
        let p = chunk_prompt(&chunk(0, 3, None), &PipelineConfig::default());
        assert!(p.starts_with(DEFAULT_INSTRUCTIONS));
        assert!(p.contains("CHUNK 1 OF 3 (the FIRST chunk)"));
        assert!(p.contains("Do NOT emit the closing </main>"));
        assert!(!p.contains("Previous Context:"));
        assert!(!p.contains("overlap from the previous chunk"));
        assert!(p.ends_with("2. Second paragraph.\n\n\"\"\""));
    }

    #[test]
    fn middle_chunk_prompt_carries_context() {
        let ctx = "Previous Context:\nSUBJ: FY25 TRAINING";
        let p = chunk_prompt(&chunk(1, 3, Some(ctx)), &PipelineConfig::default());
        assert!(p.contains("CHUNK 2 OF 3 (a MIDDLE chunk)"));
        assert!(p.contains(ctx));
        assert!(p.contains("overlap from the previous chunk"));
        assert!(p.contains("Never repeat header or title content"));
    }

    #[test]
    fn last_chunk_prompt_closes() {
        let p = chunk_prompt(&chunk(2, 3, None), &PipelineConfig::default());
        assert!(p.contains("End the output with the closing </main>"));
    }

    #[test]
    fn custom_instructions_replace_default() {
        let config = PipelineConfig::builder()
            .instructions("Summarise as flashcards.")
            .build()
            .unwrap();
        let p = chunk_prompt(&chunk(0, 1, None), &config);
        assert!(p.starts_with("Summarise as flashcards."));
        assert!(!p.contains(DEFAULT_INSTRUCTIONS));
    }

    #[test]
    fn system_prompt_names_content_type() {
        assert!(system_prompt("flashcards").contains("flashcards documents"));
    }
}
