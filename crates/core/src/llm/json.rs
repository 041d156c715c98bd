use crate::llm::error::ServiceError;
use serde::de::DeserializeOwned;

pub fn extract_json(text: &str) -> Option<String> {
    let mut body = text.trim();

    // Peel a Markdown fence (```json ... ```), tolerating a missing
    // language tag, closing fence, or trailing newline.
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = match rest.rsplit_once("```") {
            Some((inner, _)) => inner,
            None => rest,
        }
        .trim();
    }

    // Keep the widest brace window: first '{' to last '}'.
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| body[start..=end].to_string())
}

/// Decodes model message content into `T`, tolerating fences and
/// surrounding prose. Failure is a `ServiceError::Parse` carrying the raw
/// output for diagnostics.
pub fn decode_answer<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    let json_str = extract_json(content).unwrap_or_else(|| content.trim().to_string());
    serde_json::from_str::<T>(&json_str)
        .map_err(|e| ServiceError::parse(e.to_string(), Some(content.to_string())).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        a: i64,
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        for fenced in [
            format!("```json\n{body}\n```\n"),
            format!("```\n{body}\n```"),
            // No trailing newline before the closing fence.
            format!("```json\n{body}```"),
            // Model ran out of tokens before closing the fence.
            format!("```json\n{body}"),
        ] {
            assert_eq!(extract_json(&fenced), Some(body.to_string()), "{fenced:?}");
        }
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no object here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn decode_answer_accepts_plain_json() {
        let probe: Probe = decode_answer("{\"a\": 7}").unwrap();
        assert_eq!(probe.a, 7);
    }

    #[test]
    fn decode_answer_accepts_fenced_json() {
        let probe: Probe = decode_answer("```json\n{\"a\": 7}\n```").unwrap();
        assert_eq!(probe.a, 7);
    }

    #[test]
    fn decode_answer_surfaces_parse_error_with_raw_output() {
        let err = decode_answer::<Probe>("sorry, I cannot help with that").unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        match service {
            ServiceError::Parse { raw_output, .. } => {
                assert!(raw_output.as_deref().unwrap().contains("sorry"));
            }
            other => panic!("expected parse error, got {other}"),
        }
    }
}
