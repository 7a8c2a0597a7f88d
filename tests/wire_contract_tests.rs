/// Tests for wire-level conventions of the admin backend
///
/// Note: These are unit tests that verify the conventions are correct.
/// Integration tests would require a running server and Redis.

#[cfg(test)]
mod tests {
    use serde_json::Value;

    // Generated user IDs: 10 digits, first digit non-zero
    #[test]
    fn test_user_id_shape() {
        use rand::Rng;

        for _ in 0..100 {
            let mut rng = rand::thread_rng();
            let mut id = String::with_capacity(10);
            id.push(char::from(b'1' + rng.gen_range(0..9)));
            for _ in 0..9 {
                id.push(char::from(b'0' + rng.gen_range(0..10)));
            }

            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(id.chars().next(), Some('0'));
            assert!(id.parse::<u64>().is_ok());
        }
    }

    // Signed session tokens carry subject and user type and round-trip
    // through HS256
    #[test]
    fn test_session_token_round_trip() {
        use jsonwebtoken::{
            decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
        };
        use serde::{Deserialize, Serialize};

        #[derive(Serialize, Deserialize)]
        struct Claims {
            sub: String,
            user_type: i64,
            exp: i64,
            iat: i64,
        }

        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "1234567890".to_string(),
            user_type: 2,
            exp: now + 3600,
            iat: now,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "1234567890");
        assert_eq!(decoded.claims.user_type, 2);

        // wrong secret must not verify
        assert!(decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::new(Algorithm::HS256),
        )
        .is_err());
    }

    // Directory responses use the {errCode, errMsg, data} envelope
    #[test]
    fn test_directory_envelope_shape() {
        let ok: Value =
            serde_json::from_str(r#"{"errCode":0,"errMsg":"","data":{"token":"abc"}}"#).unwrap();
        assert_eq!(ok["errCode"], 0);
        assert_eq!(ok["data"]["token"], "abc");

        let err: Value =
            serde_json::from_str(r#"{"errCode":1004,"errMsg":"record not found","data":null}"#)
                .unwrap();
        assert_ne!(err["errCode"], 0);
        assert!(err["data"].is_null());
    }

    // Error responses expose a stable machine-readable kind
    #[test]
    fn test_error_body_shape() {
        let body: Value = serde_json::from_str(
            r#"{"error":"DuplicateCredential","message":"Duplicate credential: alice1"}"#,
        )
        .unwrap();
        assert!(body["error"].as_str().is_some());
        assert!(body["message"].as_str().is_some());
    }

    // Menu keys derive their parent from the prefix before the first
    // delimiter only
    #[test]
    fn test_menu_key_parent_prefix() {
        let parent = |key: &str| key.find('-').map(|idx| key[..idx].to_string());

        assert_eq!(parent("users-list"), Some("users".to_string()));
        assert_eq!(parent("a-b-c"), Some("a".to_string()));
        assert_eq!(parent("users"), None);
    }
}
