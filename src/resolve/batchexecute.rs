//! Request/response codec for the aggregator's `batchexecute` RPC.
//!
//! The request is a form body with a single `f.req` field holding a nested
//! array envelope. The `Fbv4je` call takes a JSON *string* whose content is
//! the `garturlreq` array carrying the article token, timestamp and signature.
//!
//! The response starts with an anti-XSSI prefix (`)]}'` plus length lines)
//! followed by a JSON array of frames. The frame for our call holds another
//! JSON string at index 2; its element 1 is the publisher URL.

use serde_json::{Value, json};

const RPC_ID: &str = "Fbv4je";

/// `f.req=<url-encoded envelope>`, or `None` when the timestamp is not numeric.
pub fn request_body(token: &str, timestamp: &str, signature: &str) -> Option<String> {
    let timestamp: i64 = timestamp.trim().parse().ok()?;
    let inner = json!([
        "garturlreq",
        [
            ["X", "X", ["X", "X"], null, null, 1, 1, "US:en", null, 1, null, null, null, null, null, 0, 1],
            "X", "X", 1, [1, 1, 1], 1, 1, null, 0, 0, null, 0
        ],
        token,
        timestamp,
        signature
    ]);
    let envelope = json!([[[RPC_ID, inner.to_string(), null, "generic"]]]);
    Some(format!("f.req={}", urlencoding::encode(&envelope.to_string())))
}

/// Pull the decoded publisher URL out of a raw `batchexecute` response.
pub fn parse_response(body: &str) -> Option<String> {
    let start = body.find('[')?;
    let root = serde_json::Deserializer::from_str(&body[start..])
        .into_iter::<Value>()
        .next()?
        .ok()?;
    find_url(&root)
}

fn find_url(value: &Value) -> Option<String> {
    let items = value.as_array()?;
    if let Some(url) = items.get(2).and_then(Value::as_str).and_then(inner_url) {
        return Some(url);
    }
    items.iter().find_map(find_url)
}

fn inner_url(payload: &str) -> Option<String> {
    if !payload.trim_start().starts_with('[') {
        return None;
    }
    let inner: Value = serde_json::from_str(payload).ok()?;
    let url = inner.get(1)?.as_str()?;
    url.starts_with("http").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_body(body: &str) -> Value {
        let encoded = body.strip_prefix("f.req=").unwrap();
        let decoded = urlencoding::decode(encoded).unwrap();
        serde_json::from_str(&decoded).unwrap()
    }

    #[test]
    fn test_request_body_envelope_shape() {
        let body = request_body("CBMiTok", "1715000000", "AU_sig").unwrap();
        let envelope = decode_body(&body);

        let call = &envelope[0][0];
        assert_eq!(call[0], "Fbv4je");
        assert_eq!(call[2], Value::Null);
        assert_eq!(call[3], "generic");

        let inner: Value = serde_json::from_str(call[1].as_str().unwrap()).unwrap();
        assert_eq!(inner[0], "garturlreq");
        assert_eq!(inner[1][0][7], "US:en");
        assert_eq!(inner[2], "CBMiTok");
        assert_eq!(inner[3], 1715000000);
        assert_eq!(inner[4], "AU_sig");
    }

    #[test]
    fn test_request_body_inner_is_compact_json() {
        let body = request_body("T", "1", "S").unwrap();
        let envelope = decode_body(&body);
        let inner = envelope[0][0][1].as_str().unwrap();
        assert!(inner.starts_with("[\"garturlreq\",[[\"X\",\"X\",[\"X\",\"X\"],null,null,1,1,\"US:en\""));
        assert!(inner.ends_with(",\"T\",1,\"S\"]"));
    }

    #[test]
    fn test_request_body_rejects_non_numeric_timestamp() {
        assert!(request_body("T", "soon", "S").is_none());
    }

    #[test]
    fn test_parse_response_with_xssi_prefix() {
        let body = concat!(
            ")]}'\n\n",
            "293\n",
            r#"[["wrb.fr","Fbv4je","[\"garturlres\",\"https://publisher.example/story?id=7\",1]",null,null,null,"generic"],["di",42],["af.httprm",42,"-1",11]]"#,
            "\n25\n",
            r#"[["e",4,null,null,331]]"#
        );
        assert_eq!(
            parse_response(body).as_deref(),
            Some("https://publisher.example/story?id=7")
        );
    }

    #[test]
    fn test_parse_response_misses() {
        assert_eq!(parse_response(""), None);
        assert_eq!(parse_response(")]}'\n\nnot json"), None);
        assert_eq!(parse_response(r#"[["wrb.fr","Fbv4je",null]]"#), None);
        assert_eq!(
            parse_response(r#"[["wrb.fr","Fbv4je","[\"garturlres\",\"relative/path\",1]"]]"#),
            None
        );
        assert_eq!(parse_response(r#"[["wrb.fr","Fbv4je","[\"garturlres\"]"]]"#), None);
    }
}
