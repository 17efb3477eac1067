//! Pre-segmented parts collaborator: fetches a JSON document from a local
//! path or an http(s) URL and gathers every string found anywhere in the
//! tree under a `textForVoiceover` field, in document order.

use crate::error::AlignError;
use serde_json::Value;
use url::Url;

/// Load and flatten the pre-segmented parts list from `source`, which is
/// either a local filesystem path or an `http(s)://` URL.
pub async fn load_text_parts(source: &str, client: &reqwest::Client) -> crate::Result<Vec<String>> {
    let raw = match Url::parse(source) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| AlignError::InvalidInput(format!("failed to fetch text-parts source: {e}")))?;
            response
                .text()
                .await
                .map_err(|e| AlignError::InvalidInput(format!("failed to read text-parts response: {e}")))?
        }
        _ => std::fs::read_to_string(source)
            .map_err(|e| AlignError::InvalidInput(format!("failed to read text-parts file {source:?}: {e}")))?,
    };

    let value: Value = serde_json::from_str(&raw)?;
    let mut parts = Vec::new();
    gather_text_for_voiceover(&value, &mut parts);
    Ok(parts)
}

fn gather_text_for_voiceover(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if key == "textForVoiceover" {
                    match v {
                        Value::String(s) => out.push(s.clone()),
                        Value::Array(items) => {
                            for item in items {
                                if let Value::String(s) = item {
                                    out.push(s.clone());
                                }
                            }
                        }
                        _ => {}
                    }
                } else {
                    gather_text_for_voiceover(v, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                gather_text_for_voiceover(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gathers_strings_anywhere_in_tree() {
        let tree = json!({
            "mangaTree": [
                {"boxData": {"textForVoiceover": ["first", "second"]}},
                {"nested": {"boxData": {"textForVoiceover": "third"}}}
            ]
        });
        let mut out = Vec::new();
        gather_text_for_voiceover(&tree, &mut out);
        assert_eq!(out, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn loads_parts_from_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parts.json");
        std::fs::write(&path, r#"{"textForVoiceover": ["hello"]}"#).unwrap();
        let client = reqwest::Client::new();
        let parts = load_text_parts(path.to_str().unwrap(), &client).await.unwrap();
        assert_eq!(parts, vec!["hello".to_string()]);
    }
}
