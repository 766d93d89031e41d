use serde::{Deserialize, Deserializer, Serialize};

/// One expense as extracted from free text: a display label and an amount.
///
/// The amount is kept exactly as written (currency symbols, thousands separators) since the
/// spreadsheet interprets it on write.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExpenseEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "amount_text")]
    pub amount: String,
}

impl ExpenseEntry {
    pub fn new(name: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount: amount.into(),
        }
    }
}

/// The result of running free text through an extraction provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entries: Vec<ExpenseEntry>,
    #[serde(default)]
    pub confidence: f64,
}

/// Models sometimes emit `"amount": 500` instead of `"amount": "$500"`.
fn amount_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ExpenseEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ExpenseEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_amount_becomes_text() {
        let e: ExpenseEntry = serde_json::from_str(r#"{"name":"Pan","amount":500}"#).unwrap();
        assert_eq!(e, ExpenseEntry::new("Pan", "500"));
    }

    #[test]
    fn test_missing_entries_is_empty() {
        let x: Extraction = serde_json::from_str(r#"{"confidence":0.4}"#).unwrap();
        assert!(x.entries.is_empty());
        let x: Extraction = serde_json::from_str(r#"{"entries":null}"#).unwrap();
        assert!(x.entries.is_empty());
        assert_eq!(x.confidence, 0.0);
    }
}
