//! Gemini / Gemma model selection
//!
//! Named models map to their `generateContent` API names. Anything else is
//! passed through verbatim as a custom model name.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GeminiModel {
    #[default]
    Gemini25Flash,
    Gemini25FlashLite,
    Gemini25FlashTts,
    Gemini25FlashNativeAudio,
    Gemini3Flash,
    GeminiRoboticsEr15,
    Gemma3_1B,
    Gemma3_2B,
    Gemma3_4B,
    Gemma3_12B,
    Gemma3_27B,
    /// Any other model name, used as-is
    Custom(String),
}

impl GeminiModel {
    /// Every named model, in catalog order
    pub const NAMED: [GeminiModel; 11] = [
        GeminiModel::Gemini25Flash,
        GeminiModel::Gemini25FlashLite,
        GeminiModel::Gemini25FlashTts,
        GeminiModel::Gemini25FlashNativeAudio,
        GeminiModel::Gemini3Flash,
        GeminiModel::GeminiRoboticsEr15,
        GeminiModel::Gemma3_1B,
        GeminiModel::Gemma3_2B,
        GeminiModel::Gemma3_4B,
        GeminiModel::Gemma3_12B,
        GeminiModel::Gemma3_27B,
    ];

    /// Name used in the request path (`models/{api_name}:generateContent`)
    pub fn api_name(&self) -> &str {
        match self {
            GeminiModel::Gemini25Flash => "gemini-2.5-flash",
            GeminiModel::Gemini25FlashLite => "gemini-2.5-flash-lite",
            GeminiModel::Gemini25FlashTts => "gemini-2.5-flash-tts",
            GeminiModel::Gemini25FlashNativeAudio => "gemini-2.5-flash-native-audio-dialog",
            GeminiModel::Gemini3Flash => "gemini-3-flash",
            GeminiModel::GeminiRoboticsEr15 => "gemini-robotics-er-1.5-preview",
            GeminiModel::Gemma3_1B => "gemma-3-1b",
            GeminiModel::Gemma3_2B => "gemma-3-2b",
            GeminiModel::Gemma3_4B => "gemma-3-4b",
            GeminiModel::Gemma3_12B => "gemma-3-12b",
            GeminiModel::Gemma3_27B => "gemma-3-27b",
            GeminiModel::Custom(name) => name,
        }
    }

    /// Resolve a configured model name. Blank names select the default.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return Self::default();
        }
        Self::NAMED
            .into_iter()
            .find(|m| m.api_name().eq_ignore_ascii_case(name))
            .unwrap_or_else(|| GeminiModel::Custom(name.to_string()))
    }
}

impl fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}
