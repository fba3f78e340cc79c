//! Prompt construction for codeframe-constrained coding.
//!
//! The prompt is the first half of the output contract: it embeds the full
//! codeframe so the model sees every legal code and description, forbids
//! inventing codes, and pins the reply to one JSON object with fixed key
//! names. The interpreter enforces the other half.

use crate::codeframe::Codeframe;
use crate::gateway::Message;

/// System-level directive sent alongside every coding prompt.
pub const CODING_SYSTEM_PROMPT: &str =
    "You are a consultation coding expert. You analyze consultation responses and assign \
     codes from a fixed codeframe. Reply with a single JSON object and nothing else.";

/// Rendered prompt ready for the gateway.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::user(&self.user)]
    }
}

/// Build the coding prompt for one (question, response) pair.
///
/// `response` is expected to already be cleaned by [`crate::normalize::clean`].
pub fn build_coding_prompt(
    question: &str,
    response: &str,
    codeframe: &Codeframe,
) -> PromptInstance {
    let codeframe_json = codeframe.to_document_json();

    let user = format!(
        r#"Your task is to analyze the response and assign the EXACT codes from the provided codeframe.

Question: {question}
Response: {response}

Codeframe:
{codeframe_json}

IMPORTANT INSTRUCTIONS:
1. You MUST ONLY use the exact codes provided in the codeframe (e.g., "004", "050", "203")
2. Do not create new codes or modify the existing descriptions
3. For each code you assign:
   - Provide a confidence score between 0 and 1
   - Explain why it applies to the response
   - Quote the relevant part of the response verbatim
4. You can assign multiple codes if the response covers multiple aspects
5. If no code exactly matches, do not assign a code

CRITICAL: You must return ONLY a valid JSON object, with no additional text or explanation. The JSON must use double quotes for all strings.

Return your analysis in this EXACT JSON format:
{{
    "codes": ["004", "050"],
    "confidence": {{
        "004": 0.95,
        "050": 0.90
    }},
    "explanation": {{
        "004": "The response mentions 'more reliable' which matches code 004",
        "050": "The response mentions 'encourage more people to use the bus' which matches code 050"
    }},
    "relevant_quotes": {{
        "004": "it'll make bus journeys quicker and more reliable",
        "050": "encourage more people to use the bus instead of driving"
    }},
    "error": null
}}

Remember: Return ONLY the JSON object, with no additional text or explanation."#
    );

    PromptInstance {
        system: CODING_SYSTEM_PROMPT.to_string(),
        user,
    }
}
