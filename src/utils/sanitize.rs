use serde_json::Value;

/// Masks secrets and buyer PII in JSON payloads before they are logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "email"
            | "phone"
            | "password"
            | "secret"
            | "secret_key"
            | "token"
            | "authorization"
            | "authorization_code"
            | "access_code"
            | "card"
            | "bin"
            | "last4"
            | "signature"
            | "shippingaddress"
            | "billingaddress"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let visible: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_email_and_address() {
        let input = json!({
            "email": "buyer@example.com",
            "shippingAddress": {"line1": "12 Allen Avenue", "city": "Ikeja"},
            "selectedKeys": ["a-default-default-M"]
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["email"], "buye****.com");
        assert_eq!(sanitized["shippingAddress"], "****");
        assert_eq!(sanitized["selectedKeys"][0], "a-default-default-M");
    }

    #[test]
    fn test_sanitize_nested_card() {
        let input = json!({
            "event": "charge.success",
            "data": {
                "reference": "MKT-1",
                "authorization": {"authorization_code": "AUTH_abc123xyz", "last4": "4081"}
            }
        });

        let sanitized = sanitize_json(&input);
        assert_eq!(sanitized["data"]["authorization"], "****");
        assert_eq!(sanitized["data"]["reference"], "MKT-1");
    }
}
