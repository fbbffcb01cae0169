use kbshell_schema::ConversationTurn;

/// All per-session mutable state: conversation history plus the three
/// operator toggles. One instance per shell; dies with it.
#[derive(Debug, Default)]
pub struct Session {
    pub history: Vec<ConversationTurn>,
    /// Extra diagnostic output while processing.
    pub debug: bool,
    /// Verbalize forward-chained inferences after each assertion.
    pub inference: bool,
    /// Free-form LLM echo reply before logic processing.
    pub llm_echo: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_debug(&mut self) -> bool {
        self.debug = !self.debug;
        self.debug
    }

    pub fn toggle_inference(&mut self) -> bool {
        self.inference = !self.inference;
        self.inference
    }

    pub fn toggle_llm_echo(&mut self) -> bool {
        self.llm_echo = !self.llm_echo;
        self.llm_echo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_flip_and_report() {
        let mut session = Session::new();
        assert!(!session.debug);
        assert!(session.toggle_debug());
        assert!(!session.toggle_debug());
        assert!(session.toggle_inference());
        assert!(session.toggle_llm_echo());
        assert!(session.inference);
        assert!(session.llm_echo);
    }

    #[test]
    fn history_starts_empty() {
        let session = Session::new();
        assert!(session.history.is_empty());
    }
}
