/// Response from one completion call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub in_tokens: u64,
    pub out_tokens: u64,
}

/// The contract every LLM adapter implements. Adapters themselves live
/// outside this crate; the core only ever sees this trait.
pub trait LlmProvider: Send + Sync {
    /// One completion round trip.
    fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> std::result::Result<LlmResponse, String>;

    /// Cheap reachability probe; false routes callers to a fallback.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Canned-response provider for tests and offline operation.
pub struct MockProvider {
    pub response: String,
    pub available: bool,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            response: String::new(),
            available: false,
        }
    }
}

impl LlmProvider for MockProvider {
    fn complete(
        &self,
        _system: &str,
        user: &str,
        _max_tokens: u32,
    ) -> std::result::Result<LlmResponse, String> {
        if !self.available {
            return Err("Provider unavailable".to_string());
        }
        Ok(LlmResponse {
            text: self.response.clone(),
            in_tokens: (user.len() / 4) as u64,
            out_tokens: (self.response.len() / 4) as u64,
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_round_trip() {
        let provider = MockProvider::new("structured output");
        assert!(provider.is_available());
        let response = provider.complete("sys", "user text", 256).unwrap();
        assert_eq!(response.text, "structured output");
        assert!(response.in_tokens > 0);
    }

    #[test]
    fn test_unavailable_provider_errors() {
        let provider = MockProvider::unavailable();
        assert!(!provider.is_available());
        assert!(provider.complete("s", "u", 10).is_err());
    }
}
