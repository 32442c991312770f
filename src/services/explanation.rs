use serde_json::Value;

use crate::models::{Explanation, RecommendationCandidate};

/// Builds the prompt that asks the language model to narrate a result set
///
/// Deterministic for a given input. An empty candidate list still yields a usable
/// prompt, asking for general recommendations in the category instead.
pub fn build_explanation_prompt(
    taste: &str,
    similar_tastes: &[String],
    candidates: &[RecommendationCandidate],
    category: &str,
) -> String {
    let category = if category.trim().is_empty() {
        "cultural"
    } else {
        category
    };

    let mut prompt = format!(
        "You are a cultural concierge. A user described their taste as: \"{}\".\n",
        taste.trim()
    );

    let similar: Vec<&str> = similar_tastes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !similar.is_empty() {
        prompt.push_str("They previously enjoyed:\n");
        for taste in similar {
            prompt.push_str(&format!("- {}\n", taste));
        }
    }

    if candidates.is_empty() {
        prompt.push_str(&format!(
            "\nNo specific {category} matches were found. Suggest a few general {category} \
             recommendations that fit this taste.\n\
             Respond with only a JSON object: {{\"recommendations\": [{{\"name\": string, \"explanation\": string}}]}}\n"
        ));
        return prompt;
    }

    prompt.push_str(&format!(
        "\nHere are {} {} recommendations, in ranked order:\n",
        candidates.len(),
        category
    ));
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!("{}. {}", i + 1, candidate.name));
        if let Some(address) = candidate.properties.get("address").and_then(Value::as_str) {
            prompt.push_str(&format!(" ({})", address));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "\nFor each recommendation, in the same order, write one or two sentences on why it \
         suits this taste. Respond with only a JSON object: \
         {\"recommendations\": [{\"name\": string, \"explanation\": string}]} \
         with exactly one entry per recommendation.\n",
    );
    prompt
}

/// Removes a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. "json"
    match body.split_once('\n') {
        Some((tag, content)) if !tag.trim().contains(' ') => content.trim(),
        _ => body.trim(),
    }
}

/// Parses model output, passing it through unmodified when it is not the expected shape
pub fn parse_explanation(text: &str) -> Explanation {
    match serde_json::from_str::<Value>(strip_code_fences(text)) {
        Ok(value) if value.get("recommendations").is_some_and(Value::is_array) => {
            Explanation::Structured(value)
        }
        _ => Explanation::Raw(text.to_string()),
    }
}
