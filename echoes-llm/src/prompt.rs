//! Prompt templates for Echoes LLM operations.
//!
//! Three prompts exist: the post-conversation unified analysis, the per-turn
//! mood update, and gift-tier classification. The built-in versions are
//! compiled in; hosts can replace any of them with TOML files.
//!
//! Placeholders are `{name}` and are substituted verbatim by
//! [`render_template`]. Literal JSON braces in a template are left alone as
//! long as they do not spell a variable name.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::LlmError;
use crate::types::{LlmRequest, ModelRole};

/// Post-conversation unified analysis (analysis model, JSON).
pub const UNIFIED_ANALYSIS_USER: &str = r#"You are an expert in psychology, memory and character simulation. Analyze the conversation below from the perspective of {npc_name}, a villager in Stardew Valley, and update their internal state.

**NPC:** {npc_name}
**Player:** {player_name}

**Emotional state before this conversation:**
- Mood: {current_mood} (intensity {mood_intensity}/10)

**How {npc_name} currently sees {player_name}:**
- Summary: {summary}
{traits}

**Long-term memories that stand out:**
{memories}

**Transcript:**
{transcript}

**INSTRUCTIONS**
Considering everything above, answer with ONE JSON object and nothing else:
1. Sentiment of the player's final message.
2. Memories worth keeping and preferences learned about the player.
3. {npc_name}'s mood after the conversation.
4. {npc_name}'s updated perception of the player.

**JSON OUTPUT FORMAT:**
{
  "final_player_sentiment": { "score": 0.0 },
  "memory_consolidation": {
    "episodic_memories": [
      { "title": "Short title", "description": "What happened", "emotional_impact": 0.0, "importance": 5.0, "memory_type": "GIFT_RECEIVED | SHARED_ACTIVITY | EMOTIONAL_MOMENT | PERSONAL_DISCLOSURE" }
    ],
    "learned_preferences": [
      { "category": "GIFTS | ACTIVITIES | TOPICS | FOODS", "item": "Specific thing", "preference_level": 0.0, "evidence": "What revealed it" }
    ]
  },
  "emotional_state_update": {
    "new_mood": "one of: {valid_moods}",
    "new_mood_intensity": 5.0,
    "mood_reason": "Why the mood changed",
    "interaction_summary": "One sentence on the emotional effect of the conversation",
    "joy_delta": 0.0, "sadness_delta": 0.0, "anger_delta": 0.0, "anxiety_delta": 0.0, "excitement_delta": 0.0
  },
  "personality_profile_update": {
    "new_summary": "At most 60 words on how {npc_name} feels about {player_name}",
    "new_friendliness": 5.0, "new_extroversion": 5.0, "new_sincerity": 5.0, "new_curiosity": 5.0,
    "new_trust": 5.0, "new_respect": 5.0, "new_affection": 5.0, "new_annoyance": 5.0,
    "new_admiration": 5.0, "new_romantic_interest": 5.0, "new_humor_compatibility": 5.0
  }
}

**Rules:**
- final_player_sentiment.score is between -1.0 and 1.0.
- Trait scores, intensity and importance are out of 10; emotional_impact and preference_level run from -10 to 10; deltas run from -3 to 3.
- Use empty arrays when nothing memorable happened.
- Be decisive: rudeness should cost trust and affection, warmth should earn them."#;

/// Per-turn mood update (fast model, `KEY: value` lines).
pub const EMOTIONAL_UPDATE_SYSTEM: &str = r"You track the emotions of {npc_name}, a villager in Stardew Valley.
Answer only with the requested lines. No explanations.";

/// User half of the per-turn mood update.
pub const EMOTIONAL_UPDATE_USER: &str = r"{npc_name} is currently {current_mood} (intensity {mood_intensity}/10).
{player_name} just spoke to them. The exchange felt {tone}.

Recent exchange:
{transcript}

Reply with exactly these lines:
MOOD: <one of {valid_moods}>
INTENSITY: <0-10>
JOY: <-3 to 3>
SADNESS: <-3 to 3>
ANGER: <-3 to 3>
ANXIETY: <-3 to 3>
EXCITEMENT: <-3 to 3>
SUMMARY: <one sentence on how this interaction affected {npc_name}>";

/// Gift classification (fast model, JSON).
pub const GIFT_CLASSIFICATION_SYSTEM: &str = r"You know the gift preferences of every villager in Stardew Valley.
Classify how a villager feels about an item using the game's five gift tiers.";

/// User half of gift classification.
pub const GIFT_CLASSIFICATION_USER: &str = r#"Villager: {npc_name}
Item: {item_name}
Things {npc_name} is known to love: {loved_gifts}

How does {npc_name} feel about receiving {item_name}?
Answer with JSON only: {"tier": "loved" | "liked" | "neutral" | "disliked" | "hated"}"#;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Post-conversation unified analysis.
    UnifiedAnalysis,
    /// Per-turn mood update.
    EmotionalUpdate,
    /// Gift-tier classification.
    GiftClassification,
}

impl PromptId {
    /// Every prompt id.
    pub const ALL: [PromptId; 3] = [
        Self::UnifiedAnalysis,
        Self::EmotionalUpdate,
        Self::GiftClassification,
    ];

    /// Stable name, also the TOML file stem.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnifiedAnalysis => "unified_analysis",
            Self::EmotionalUpdate => "emotional_update",
            Self::GiftClassification => "gift_classification",
        }
    }

    /// TOML filename (without directory) for this prompt.
    #[must_use]
    pub fn filename(self) -> String {
        format!("{}.toml", self.as_str())
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown prompt id: '{s}'"))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: PromptTemplate,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    /// Version string, e.g. "1.0" or "builtin".
    pub version: String,
    /// Model the prompt is written for.
    pub role: ModelRole,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request JSON-only output from the backend.
    #[serde(default)]
    pub json_mode: bool,
    /// System prompt template; may be empty.
    #[serde(default)]
    pub system: String,
    /// User prompt template.
    pub user: String,
}

impl PromptTemplate {
    fn builtin(role: ModelRole, max_tokens: u32, temperature: f32, json_mode: bool, system: &str, user: &str) -> Self {
        Self {
            version: "builtin".into(),
            role,
            max_tokens,
            temperature,
            json_mode,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Loads prompt templates and turns them into requests.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptEngine {
    /// Engine with every compiled-in template.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            PromptId::UnifiedAnalysis,
            PromptTemplate::builtin(ModelRole::Analysis, 1200, 0.4, true, "", UNIFIED_ANALYSIS_USER),
        );
        templates.insert(
            PromptId::EmotionalUpdate,
            PromptTemplate::builtin(
                ModelRole::Fast,
                120,
                0.3,
                false,
                EMOTIONAL_UPDATE_SYSTEM,
                EMOTIONAL_UPDATE_USER,
            ),
        );
        templates.insert(
            PromptId::GiftClassification,
            PromptTemplate::builtin(
                ModelRole::Fast,
                30,
                0.0,
                true,
                GIFT_CLASSIFICATION_SYSTEM,
                GIFT_CLASSIFICATION_USER,
            ),
        );
        Self { templates }
    }

    /// Built-in templates, with any `<id>.toml` found in `dir` replacing the
    /// compiled-in version.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if a file exists but cannot be read
    /// or parsed, or if `dir` holds no template at all.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, LlmError> {
        let dir = dir.as_ref();
        let mut engine = Self::builtin();
        let mut loaded = 0;

        for id in PromptId::ALL {
            let path: PathBuf = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| LlmError::ConfigError(format!("failed to read {}: {e}", path.display())))?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| LlmError::ConfigError(format!("failed to parse {}: {e}", path.display())))?;
            engine.templates.insert(id, parsed.prompt);
            loaded += 1;
        }

        if loaded == 0 {
            return Err(LlmError::ConfigError(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            )));
        }
        Ok(engine)
    }

    /// A loaded template.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render the template for `id` into a request.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] if the template is not loaded.
    pub fn request(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<LlmRequest, LlmError> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt template '{id}' not loaded")))?;
        Ok(LlmRequest {
            system: render_template(&tpl.system, vars),
            user: render_template(&tpl.user, vars),
            role: tpl.role,
            max_tokens: tpl.max_tokens,
            temperature: tpl.temperature,
            json_mode: tpl.json_mode,
            timeout_ms: None,
        })
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Hello {name}, {unknown}.", &[("name", "Abigail")]);
        assert_eq!(rendered, "Hello Abigail, {unknown}.");
    }

    #[test]
    fn prompt_id_round_trips() {
        for id in PromptId::ALL {
            assert_eq!(id.to_string().parse::<PromptId>(), Ok(id));
        }
        assert!("reflection".parse::<PromptId>().is_err());
    }

    #[test]
    fn builtin_request_carries_template_settings() {
        let engine = PromptEngine::builtin();
        assert_eq!(engine.len(), 3);
        let req = engine
            .request(
                PromptId::GiftClassification,
                &[("npc_name", "Abigail"), ("item_name", "Amethyst"), ("loved_gifts", "Pumpkin")],
            )
            .expect("render");
        assert_eq!(req.role, ModelRole::Fast);
        assert!(req.json_mode);
        assert!(req.user.contains("receiving Amethyst"));
        assert!(req.user.contains(r#"{"tier": "loved""#));
    }

    #[test]
    fn directory_overrides_one_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("gift_classification.toml"),
            r#"
            [prompt]
            version = "2.0"
            role = "fast"
            max_tokens = 10
            temperature = 0.0
            json_mode = true
            user = "Tier of {item_name} for {npc_name}?"
            "#,
        )
        .expect("write");
        let engine = PromptEngine::from_directory(dir.path()).expect("load");
        assert_eq!(engine.get(PromptId::GiftClassification).map(|t| t.version.as_str()), Some("2.0"));
        assert_eq!(engine.get(PromptId::UnifiedAnalysis).map(|t| t.version.as_str()), Some("builtin"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(PromptEngine::from_directory(dir.path()).is_err());
    }
}
