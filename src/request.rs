//! Debate requests: validation and prompt construction.

use crate::defaults;
use crate::error::{ColloquyError, Result};
use serde::{Deserialize, Serialize};

/// A debate participant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Panelist {
    pub id: String,
    pub name: String,
    pub tagline: String,
    pub bio: String,
    pub avatar_url: String,
    pub position: String,
}

impl Panelist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = position.into();
        self
    }

    /// Parses the CLI form `ID:NAME[:POSITION]`.
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(3, ':');
        let id = parts.next().unwrap_or_default().trim();
        let name = parts.next().unwrap_or_default().trim();
        if id.is_empty() || name.is_empty() {
            return Err(ColloquyError::InvalidRequest {
                message: format!("panelist '{spec}' must be ID:NAME[:POSITION]"),
            });
        }
        let mut panelist = Panelist::new(id, name);
        if let Some(position) = parts.next() {
            panelist.position = position.trim().to_string();
        }
        Ok(panelist)
    }

    /// The built-in moderator voice.
    pub fn moderator() -> Self {
        Self {
            id: defaults::MODERATOR_ID.to_string(),
            name: "Moderator".to_string(),
            tagline: "Neutral Facilitator".to_string(),
            bio: "Guiding the conversation".to_string(),
            avatar_url: "/avatars/moderator-avatar.png".to_string(),
            position: String::new(),
        }
    }
}

/// Request to generate one debate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateRequest {
    pub topic: String,
    #[serde(default)]
    pub selected_panelists: Vec<Panelist>,
}

impl DebateRequest {
    pub fn new(topic: impl Into<String>, panelists: Vec<Panelist>) -> Self {
        Self {
            topic: topic.into(),
            selected_panelists: panelists,
        }
    }

    /// Checks topic length and panelist count before any upstream call.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(ColloquyError::InvalidRequest {
                message: message.to_string(),
            })
        };

        let topic_len = self.topic.trim().chars().count();
        if topic_len < defaults::TOPIC_MIN_CHARS {
            return invalid("topic must be at least 10 characters");
        }
        if topic_len > defaults::TOPIC_MAX_CHARS {
            return invalid("topic must not exceed 500 characters");
        }

        let count = self.selected_panelists.len();
        if count < defaults::MIN_PANELISTS {
            return invalid("at least 2 panelists are required");
        }
        if count > defaults::MAX_PANELISTS {
            return invalid("maximum 5 panelists allowed");
        }
        if self
            .selected_panelists
            .iter()
            .any(|p| p.id.trim().is_empty() || p.name.trim().is_empty())
        {
            return invalid("all panelists must have id and name");
        }

        Ok(())
    }

    /// Looks up a speaker by id, including the moderator.
    pub fn speaker(&self, id: &str) -> Option<Panelist> {
        if id == defaults::MODERATOR_ID {
            return Some(Panelist::moderator());
        }
        self.selected_panelists.iter().find(|p| p.id == id).cloned()
    }
}

/// Builds the generation prompt asking for `[ID]: text` formatted output.
pub fn build_debate_prompt(request: &DebateRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a neutral moderator orchestrating a theological/philosophical debate between historical figures.\n\n",
    );
    prompt.push_str(&format!("Topic: {}\n\n", request.topic.trim()));
    prompt.push_str("Panelists:\n");
    for (i, panelist) in request.selected_panelists.iter().enumerate() {
        prompt.push_str(&format!("{}. {} (ID: {})\n", i + 1, panelist.name, panelist.id));
        if !panelist.bio.is_empty() {
            prompt.push_str(&format!("   Bio: {}\n", panelist.bio));
        }
        if !panelist.position.is_empty() {
            prompt.push_str(&format!("   Position: {}\n", panelist.position));
        }
    }

    prompt.push_str(
        "\nGenerate a moderated debate with the following structure:\n\
         1. The first message must be [moderator]: introducing the topic and panelists\n\
         2. Include 12-18 exchanges between panelists\n\
         3. The moderator may occasionally step in to redirect, ask clarifying questions, contrast viewpoints or summarize progress\n\
         4. The last message must be [moderator]: with a 3-5 sentence concluding summary\n\n",
    );
    prompt.push_str(
        "FORMAT REQUIREMENTS:\n\
         - Each response must start on a new line with the exact format: [ID]: text\n\
         - Use [moderator]: for moderator messages\n\
         - Use [PANELIST_ID]: for panelist messages, with the IDs listed above\n\
         - No extra text before the [ID]: marker\n\
         - Start your response immediately with [moderator]:\n\n",
    );
    prompt.push_str(
        "Guidelines:\n\
         - Moderator responses: 1-3 sentences, neutral and facilitating\n\
         - Panelist responses: 2-4 sentences (50-100 words)\n\
         - Keep each panelist's historical perspective and known positions\n\
         - Let panelists answer each other directly, not just the moderator\n\
         - The moderator intervenes naturally, not after every exchange\n\n",
    );
    prompt.push_str("Begin the debate:");

    prompt
}
