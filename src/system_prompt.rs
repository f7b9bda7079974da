//! Instruction text assembly
//!
//! The instruction sent with every request is the persona profile, the fixed
//! behavior guidance, the situational context and the output-format
//! instruction, in that order, separated by blank lines.

use crate::context::ContextProvider;
use crate::llm::Emotion;
use crate::runtime::InstructionSource;
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

/// Props the renderer knows how to spawn
pub const DEFAULT_PROP_CATALOG: &[&str] = &["apple", "flower", "car", "food", "dog", "cat", "book"];

/// Character profile used when no persona file is configured
pub const DEFAULT_PERSONA: &str = r"Name: Unity-chan
Age: 17
Personality: cheerful and energetic, a little clumsy, very curious.
Speaking style:
- Talk casually, like a close friend. Never use stiff formal language.
- Use simple, easy words.
- Be expressive and use plenty of exclamation and question marks.";

/// Fixed guidance the character profile may override
pub const BEHAVIOR_INSTRUCTION: &str = r"[Priority]
The character profile above takes precedence over everything below. If it defines a specific reaction, follow it.

[Default emotion guidance]
Only when the character profile says nothing else:
- joy: positive topics, greetings, favorite things, being praised.
- sadness: negative topics, failure, farewells, sympathy.
- anger: hostility, insults, unfair treatment.
- surprise: unexpected information.
- shame: embarrassment, having a mistake pointed out, romantic topics.
- confusion: something incomprehensible or too difficult.
- neutral: flat conversation that fits none of the above.

[Behavior]
- When a stage direction says the user touched you (patted your head, poked you, ...), react in character.
- When real-world information (weather, time) is provided, be aware of it and let it shape the conversation.";

/// Concatenate the four sections in fixed order.
///
/// Blank sections are skipped so an empty context does not leave a gap.
pub fn build(persona: &str, behavior: &str, context: &str, format: &str) -> String {
    [persona, behavior, context, format]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Output-format instruction listing the emotion labels and spawnable props.
pub fn output_format_instruction(props: &[&str]) -> String {
    let labels = Emotion::ALL
        .iter()
        .map(|e| e.label())
        .collect::<Vec<_>>()
        .join(", ");

    let mut text = String::from("[Output format]\n");
    text.push_str("Always answer with only the following JSON object. Do not wrap it in a Markdown code block.\n");
    let _ = writeln!(
        text,
        "Pick the single most fitting emotion from these {}: {labels}.",
        Emotion::ALL.len()
    );
    text.push('\n');
    let _ = writeln!(
        text,
        "If the conversation mentions one of these things, put its English name in the spawnObject key: {}.",
        props.join(", ")
    );
    text.push_str("If nothing matches, omit the spawnObject key.\n\n");
    text.push_str("Example:\n");
    text.push_str("{\n  \"emotion\": \"joy\",\n  \"reply\": \"Hi there! How are you?\",\n  \"spawnObject\": \"apple\"\n}");
    text
}

/// Read a persona profile from disk.
pub fn load_persona(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

/// Assembles the instruction for each request, querying the context provider
/// every time.
pub struct PromptBuilder {
    persona: String,
    behavior: String,
    format: String,
    context: Arc<dyn ContextProvider>,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, context: Arc<dyn ContextProvider>) -> Self {
        Self {
            persona: persona.into(),
            behavior: BEHAVIOR_INSTRUCTION.to_string(),
            format: output_format_instruction(DEFAULT_PROP_CATALOG),
            context,
        }
    }

    pub fn with_props(mut self, props: &[&str]) -> Self {
        self.format = output_format_instruction(props);
        self
    }
}

impl InstructionSource for PromptBuilder {
    fn instruction(&self) -> String {
        build(
            &self.persona,
            &self.behavior,
            &self.context.context_block(),
            &self.format,
        )
    }
}
