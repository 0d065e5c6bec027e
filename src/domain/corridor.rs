use serde::Serialize;

/// Shape of a mobile-money number in one corridor.
///
/// A number is the local trunk prefix `0` or the country code, then one of
/// `leading_digits`, then `subscriber_digits` further digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumberRule {
    pub country_code: String,
    pub leading_digits: Vec<char>,
    pub subscriber_digits: usize,
}

impl NumberRule {
    pub fn new(country_code: &str, leading_digits: &[char], subscriber_digits: usize) -> Self {
        Self {
            country_code: country_code.to_string(),
            leading_digits: leading_digits.to_vec(),
            subscriber_digits,
        }
    }

    pub fn matches(&self, digits: &str) -> bool {
        let rest = if let Some(rest) = digits.strip_prefix(self.country_code.as_str()) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else {
            return false;
        };

        let mut chars = rest.chars();
        match chars.next() {
            Some(first) if self.leading_digits.contains(&first) => {}
            _ => return false,
        }
        let tail = chars.as_str();
        tail.len() == self.subscriber_digits && tail.chars().all(|c| c.is_ascii_digit())
    }

    /// Groups digits as `+CCC XXX XXX XXX` or `0XXX XXX XXX`.
    pub fn format(&self, digits: &str) -> String {
        if let Some(rest) = digits.strip_prefix(self.country_code.as_str()) {
            let groups = split_groups(rest, &[3, 3]);
            format!("+{} {}", self.country_code, groups)
        } else {
            split_groups(digits, &[4, 3])
        }
    }
}

fn split_groups(digits: &str, widths: &[usize]) -> String {
    let mut groups = Vec::with_capacity(widths.len() + 1);
    let mut rest = digits;
    for &width in widths {
        let cut = width.min(rest.len());
        let (head, tail) = rest.split_at(cut);
        groups.push(head);
        rest = tail;
    }
    groups.push(rest);
    groups.join(" ").trim_end().to_string()
}

/// Strips everything that is not an ASCII digit.
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutMethod {
    pub id: String,
    pub name: String,
    pub number_rule: NumberRule,
}

impl PayoutMethod {
    pub fn new(id: &str, name: &str, number_rule: NumberRule) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            number_rule,
        }
    }

    pub fn country_code(&self) -> &str {
        &self.number_rule.country_code
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiatCorridor {
    /// Code shown to people, e.g. `KSH`.
    pub code: String,
    /// Code the exchange-rate feed understands, e.g. `KES`.
    #[serde(skip)]
    pub api_code: String,
    pub symbol: String,
    pub name: String,
    pub number_rule: NumberRule,
    pub methods: Vec<PayoutMethod>,
}

impl FiatCorridor {
    pub fn method(&self, id: &str) -> Option<&PayoutMethod> {
        self.methods.iter().find(|method| method.id == id)
    }

    pub fn default_method(&self) -> Option<&PayoutMethod> {
        self.methods.first()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PayoutCorridorRegistry {
    corridors: Vec<FiatCorridor>,
}

impl PayoutCorridorRegistry {
    pub fn new(corridors: Vec<FiatCorridor>) -> Self {
        Self { corridors }
    }

    /// Uganda, Kenya and Rwanda mobile-money corridors.
    pub fn builtin() -> Self {
        let uganda = NumberRule::new("256", &['7'], 8);
        let kenya = NumberRule::new("254", &['1', '7'], 8);
        let rwanda = NumberRule::new("250", &['7'], 8);

        Self::new(vec![
            FiatCorridor {
                code: "UGX".into(),
                api_code: "UGX".into(),
                symbol: "USh".into(),
                name: "Ugandan Shilling".into(),
                methods: vec![
                    PayoutMethod::new("mtn", "MTN Mobile Money", uganda.clone()),
                    PayoutMethod::new("airtel", "Airtel Money", uganda.clone()),
                ],
                number_rule: uganda,
            },
            FiatCorridor {
                code: "KSH".into(),
                api_code: "KES".into(),
                symbol: "KSh".into(),
                name: "Kenyan Shilling".into(),
                methods: vec![PayoutMethod::new("mpesa", "M-PESA", kenya.clone())],
                number_rule: kenya,
            },
            FiatCorridor {
                code: "RWF".into(),
                api_code: "RWF".into(),
                symbol: "Rwf".into(),
                name: "Rwandan Franc".into(),
                methods: vec![
                    PayoutMethod::new("rwanda", "Rwanda Mobile Money", rwanda.clone()),
                    PayoutMethod::new("airtel", "Airtel Money", rwanda.clone()),
                ],
                number_rule: rwanda,
            },
        ])
    }

    pub fn corridors(&self) -> &[FiatCorridor] {
        &self.corridors
    }

    pub fn get(&self, code: &str) -> Option<&FiatCorridor> {
        self.corridors.iter().find(|corridor| corridor.code == code)
    }

    /// Empty for unrecognized corridors.
    pub fn payment_methods_for(&self, code: &str) -> &[PayoutMethod] {
        self.get(code)
            .map(|corridor| corridor.methods.as_slice())
            .unwrap_or_default()
    }

    pub fn validate_number(&self, code: &str, raw: &str) -> bool {
        self.get(code)
            .is_some_and(|corridor| corridor.number_rule.matches(&normalize_number(raw)))
    }

    /// Display form of `raw`; input for unknown corridors is returned as-is.
    pub fn format_number(&self, code: &str, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        match self.get(code) {
            Some(corridor) => corridor.number_rule.format(&normalize_number(raw)),
            None => raw.to_string(),
        }
    }

    /// Code the rate feed expects for a display code. Unknown codes pass
    /// through unchanged.
    pub fn api_code_for(&self, code: &str) -> String {
        self.get(code)
            .map(|corridor| corridor.api_code.clone())
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_methods_per_corridor() {
        let registry = PayoutCorridorRegistry::builtin();
        let ids: Vec<_> = registry
            .payment_methods_for("UGX")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["mtn", "airtel"]);
        assert_eq!(registry.payment_methods_for("KSH")[0].id, "mpesa");
        assert!(registry.payment_methods_for("NGN").is_empty());
    }

    #[test]
    fn test_validate_local_and_international_forms() {
        let registry = PayoutCorridorRegistry::builtin();

        assert!(registry.validate_number("UGX", "0772123456"));
        assert!(registry.validate_number("UGX", "+256 772 123 456"));
        assert!(registry.validate_number("KSH", "0112345678"));
        assert!(registry.validate_number("KSH", "254712345678"));
        assert!(registry.validate_number("RWF", "0781234567"));

        // Wrong operator prefix, wrong length, double trunk prefix.
        assert!(!registry.validate_number("UGX", "0612345678"));
        assert!(!registry.validate_number("UGX", "077212345"));
        assert!(!registry.validate_number("UGX", "00772123456"));
        // A Kenyan number is not reinterpreted as Ugandan.
        assert!(!registry.validate_number("UGX", "254712345678"));
        assert!(!registry.validate_number("NGN", "0772123456"));
    }

    #[test]
    fn test_format_number() {
        let registry = PayoutCorridorRegistry::builtin();
        assert_eq!(registry.format_number("UGX", "0772123456"), "0772 123 456");
        assert_eq!(registry.format_number("UGX", "256772123456"), "+256 772 123 456");
        assert_eq!(registry.format_number("KSH", "07121"), "0712 1");
        assert_eq!(registry.format_number("KSH", ""), "");
        assert_eq!(registry.format_number("NGN", "0803"), "0803");
    }

    #[test]
    fn test_formatting_preserves_validity() {
        let registry = PayoutCorridorRegistry::builtin();
        let samples = [
            ("UGX", "0772123456"),
            ("UGX", "256701234567"),
            ("KSH", "0712345678"),
            ("KSH", "254112345678"),
            ("RWF", "0788123456"),
            ("RWF", "250788123456"),
        ];
        for (code, number) in samples {
            assert!(registry.validate_number(code, number));
            let formatted = registry.format_number(code, number);
            let digits = normalize_number(&formatted);
            assert_eq!(digits, number);
            assert!(registry.validate_number(code, &digits), "{code} {formatted}");
        }
    }

    #[test]
    fn test_api_code_mapping() {
        let registry = PayoutCorridorRegistry::builtin();
        assert_eq!(registry.api_code_for("KSH"), "KES");
        assert_eq!(registry.api_code_for("UGX"), "UGX");
        assert_eq!(registry.api_code_for("EUR"), "EUR");
    }

    #[test]
    fn test_api_code_is_not_serialized() {
        let registry = PayoutCorridorRegistry::builtin();
        let json = serde_json::to_string(registry.get("KSH").unwrap()).unwrap();
        assert!(json.contains("\"KSH\""));
        assert!(!json.contains("KES"));
    }
}
