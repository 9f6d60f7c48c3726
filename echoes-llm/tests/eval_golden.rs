//! Prompt and reply golden set.
//!
//! Two halves:
//! - **Prompts**: each built-in template rendered with realistic variables
//!   must contain the facts it was given and no unresolved placeholders.
//! - **Replies**: replies captured from real models (chatty, fenced, quoted
//!   numbers) must parse into the structured shapes, and broken ones must
//!   be rejected rather than half-applied.

use echoes_llm::parse::{extract_prefixed, extract_prefixed_f32, parse_structured};
use echoes_llm::prompt::{self, PromptEngine, PromptId};
use echoes_llm::types::UnifiedAnalysis;
use echoes_llm::{LlmError, ModelRole};

struct GoldenCase {
    name: &'static str,
    template: &'static str,
    vars: Vec<(&'static str, &'static str)>,
    must_contain: Vec<&'static str>,
    must_not_contain: Vec<&'static str>,
}

const VALID_MOODS: &str =
    "VERY_HAPPY, HAPPY, CONTENT, NEUTRAL, WORRIED, SAD, ANGRY, EXCITED, ROMANTIC, NOSTALGIC, STRESSED";

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            name: "analysis_friendly_gem_chat",
            template: prompt::UNIFIED_ANALYSIS_USER,
            vars: vec![
                ("npc_name", "Abigail"),
                ("player_name", "Ash"),
                ("current_mood", "CONTENT"),
                ("mood_intensity", "5.0"),
                ("summary", "Someone new! I wonder if they're into adventure and fun stuff."),
                ("traits", "- Trust: 5.5/10\n- Affection: 4.0/10\n- Annoyance: 2.0/10"),
                ("memories", "- They said: 'I found an amethyst in the mines'"),
                ("transcript", "Player: I love collecting gems!\nAbigail: No way, me too!"),
                ("valid_moods", VALID_MOODS),
            ],
            must_contain: vec![
                "perspective of Abigail",
                "I love collecting gems!",
                "found an amethyst",
                "Trust: 5.5/10",
                "NOSTALGIC",
                "\"final_player_sentiment\"",
            ],
            must_not_contain: vec!["{npc_name}", "{transcript}", "{valid_moods}", "{traits}"],
        },
        GoldenCase {
            name: "analysis_without_memories",
            template: prompt::UNIFIED_ANALYSIS_USER,
            vars: vec![
                ("npc_name", "Shane"),
                ("player_name", "Gary"),
                ("current_mood", "STRESSED"),
                ("mood_intensity", "7.0"),
                ("summary", "Another farmer poking around. Great."),
                ("traits", "- Trust: 2.0/10"),
                ("memories", "No specific long-term memories stand out right now."),
                ("transcript", "Player: Nice chickens.\nShane: ...thanks, I guess."),
                ("valid_moods", VALID_MOODS),
            ],
            must_contain: vec!["Shane", "Gary", "No specific long-term memories", "STRESSED"],
            must_not_contain: vec!["{player_name}", "{memories}"],
        },
        GoldenCase {
            name: "emotional_update_system",
            template: prompt::EMOTIONAL_UPDATE_SYSTEM,
            vars: vec![("npc_name", "Emily")],
            must_contain: vec!["Emily", "Stardew Valley"],
            must_not_contain: vec!["{npc_name}"],
        },
        GoldenCase {
            name: "emotional_update_provocative",
            template: prompt::EMOTIONAL_UPDATE_USER,
            vars: vec![
                ("npc_name", "Haley"),
                ("player_name", "Ash"),
                ("current_mood", "HAPPY"),
                ("mood_intensity", "6.0"),
                ("tone", "provocative"),
                ("transcript", "Player: Your photos are boring."),
                ("valid_moods", VALID_MOODS),
            ],
            must_contain: vec!["MOOD:", "SUMMARY:", "provocative", "photos are boring", "EXCITEMENT:"],
            must_not_contain: vec!["{tone}", "{transcript}"],
        },
        GoldenCase {
            name: "gift_classification_unknown_item",
            template: prompt::GIFT_CLASSIFICATION_USER,
            vars: vec![
                ("npc_name", "Linus"),
                ("item_name", "Mystery Box"),
                ("loved_gifts", "Blueberry Tart, Cactus Fruit, Coconut, Dish O' The Sea, Yam"),
            ],
            must_contain: vec!["Linus", "Mystery Box", "Cactus Fruit", "\"tier\""],
            must_not_contain: vec!["{item_name}", "{loved_gifts}"],
        },
    ]
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

#[test]
fn golden_prompts_render_without_unresolved_vars() {
    for case in golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);
        for needle in &case.must_contain {
            assert!(
                rendered.contains(needle),
                "Golden case '{}': rendered prompt must contain '{needle}'.\nRendered:\n{}",
                case.name,
                &rendered[..rendered.len().min(500)]
            );
        }
        for needle in &case.must_not_contain {
            assert!(
                !rendered.contains(needle),
                "Golden case '{}': rendered prompt must NOT contain '{needle}'.",
                case.name
            );
        }
    }
}

#[test]
fn analysis_prompt_asks_for_every_trait() {
    for t in [
        "friendliness",
        "extroversion",
        "sincerity",
        "curiosity",
        "trust",
        "respect",
        "affection",
        "annoyance",
        "admiration",
        "romantic_interest",
        "humor_compatibility",
    ] {
        assert!(
            prompt::UNIFIED_ANALYSIS_USER.contains(&format!("\"new_{t}\"")),
            "analysis prompt is missing new_{t}"
        );
    }
}

#[test]
fn builtin_engine_routes_roles() {
    let engine = PromptEngine::builtin();
    let analysis = engine
        .request(PromptId::UnifiedAnalysis, &[("npc_name", "Abigail")])
        .expect("render");
    assert_eq!(analysis.role, ModelRole::Analysis);
    assert!(analysis.json_mode);
    assert!(analysis.system.is_empty());

    let mood = engine
        .request(PromptId::EmotionalUpdate, &[("npc_name", "Abigail")])
        .expect("render");
    assert_eq!(mood.role, ModelRole::Fast);
    assert!(!mood.json_mode);
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

const CHATTY_FENCED_REPLY: &str = r#"Of course! Here is my analysis of the conversation:

```json
{
  "final_player_sentiment": { "score": "0.8" },
  "memory_consolidation": {
    "episodic_memories": [
      {
        "title": "Gem talk",
        "description": "Ash told me they love collecting gems, just like me.",
        "emotional_impact": 6,
        "importance": 7.5,
        "memory_type": "SHARED_ACTIVITY"
      }
    ],
    "learned_preferences": [
      { "category": "HOBBIES", "item": "gem collecting", "preference_level": 8, "evidence": "Said 'I love collecting gems!'" }
    ]
  },
  "emotional_state_update": {
    "new_mood": "EXCITED",
    "new_mood_intensity": 7,
    "mood_reason": "Found someone who shares my hobby",
    "interaction_summary": "A fun chat about gems.",
    "joy_delta": 1.5
  },
  "personality_profile_update": {
    "new_summary": "Ash seems like a kindred spirit who loves adventure.",
    "new_trust": 6.5,
    "new_affection": 5.5,
    "new_annoyance": 1.0
  }
}
```

Let me know if you need anything else!"#;

#[test]
fn chatty_fenced_reply_parses() {
    let a: UnifiedAnalysis = parse_structured(CHATTY_FENCED_REPLY).expect("parse");
    let sentiment = a.final_player_sentiment.expect("sentiment");
    assert!((sentiment.score - 0.8).abs() < 1e-6);

    let mem = a.memory_consolidation.expect("memory");
    assert_eq!(mem.episodic_memories.len(), 1);
    assert_eq!(mem.learned_preferences[0].item, "gem collecting");

    let emo = a.emotional_state_update.expect("emotion");
    assert_eq!(emo.new_mood, "EXCITED");
    assert_eq!(emo.joy_delta, Some(1.5));
    assert_eq!(emo.anger_delta, None);

    let p = a.personality_profile_update.expect("personality");
    assert_eq!(p.trait_values().len(), 3);
}

#[test]
fn empty_sections_are_fine() {
    let reply = r#"{"final_player_sentiment": {"score": 0},
                    "memory_consolidation": {"episodic_memories": [], "learned_preferences": []}}"#;
    let a: UnifiedAnalysis = parse_structured(reply).expect("parse");
    assert!(a.memory_consolidation.expect("present").episodic_memories.is_empty());
    assert!(a.emotional_state_update.is_none());
}

#[test]
fn broken_replies_are_rejected() {
    let cases = [
        "I'm sorry, I can't help with that.",
        r#"{"final_player_sentiment": {"score": "quite nice"}}"#,
        r#"{"emotional_state_update": {"new_mood_intensity": 7}}"#,
        r#"{"memory_consolidation": {"episodic_memories": "none"}}"#,
        r#"{"personality_profile_update": {"new_trust": 7.5,}}"#,
    ];
    for reply in cases {
        let result = parse_structured::<UnifiedAnalysis>(reply);
        assert!(
            matches!(result, Err(LlmError::ParseError(_) | LlmError::SchemaValidation(_))),
            "expected rejection for: {reply}"
        );
    }
}

#[test]
fn mood_lines_reply_parses() {
    let reply = "MOOD: WORRIED\nINTENSITY: 6.5\nJOY: -1\nSADNESS: 0.5\nANGER: 0\nANXIETY: 2\nEXCITEMENT: -0.5\nSUMMARY: Ash's comment made me uneasy.";
    assert_eq!(extract_prefixed(reply, "MOOD:").as_deref(), Some("WORRIED"));
    assert_eq!(extract_prefixed_f32(reply, "INTENSITY:"), Some(6.5));
    assert_eq!(extract_prefixed_f32(reply, "ANXIETY:"), Some(2.0));
    assert_eq!(
        extract_prefixed(reply, "SUMMARY:").as_deref(),
        Some("Ash's comment made me uneasy.")
    );
}
