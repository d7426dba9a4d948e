// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::{legacy::LegacySigner, prev::PrevTxVerifier};

/// Per-input function context, previous transaction replay
/// or legacy signature re-stream
pub struct Function {
    inner: FunctionType,
}

impl Default for Function {
    fn default() -> Self {
        Self {
            inner: FunctionType::None,
        }
    }
}

/// Enum for internal state machines to allow memory to be shared between functions
#[allow(clippy::large_enum_variant)]
enum FunctionType {
    None,

    PrevTx(PrevTxVerifier),

    LegacySign(LegacySigner),
}

impl Function {
    /// Create a new / empty function context
    pub const fn new() -> Self {
        Self {
            inner: FunctionType::None,
        }
    }

    /// Setup previous transaction verifier context
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn prev_tx_init(&mut self, v: PrevTxVerifier) -> &mut PrevTxVerifier {
        // Clear function prior to init (executes drop)
        self.clear();

        self.inner = FunctionType::PrevTx(v);

        match &mut self.inner {
            FunctionType::PrevTx(v) => v,
            _ => unreachable!(),
        }
    }

    /// Fetch previous transaction verifier context
    pub fn prev_tx(&mut self) -> Option<&mut PrevTxVerifier> {
        match &mut self.inner {
            FunctionType::PrevTx(v) => Some(v),
            _ => None,
        }
    }

    /// Fetch previous transaction verifier context
    pub fn prev_tx_ref(&self) -> Option<&PrevTxVerifier> {
        match &self.inner {
            FunctionType::PrevTx(v) => Some(v),
            _ => None,
        }
    }

    /// Setup legacy signer context
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn legacy_signer_init(&mut self, s: LegacySigner) -> &mut LegacySigner {
        self.clear();

        self.inner = FunctionType::LegacySign(s);

        match &mut self.inner {
            FunctionType::LegacySign(s) => s,
            _ => unreachable!(),
        }
    }

    /// Fetch legacy signer context
    pub fn legacy_signer(&mut self) -> Option<&mut LegacySigner> {
        match &mut self.inner {
            FunctionType::LegacySign(s) => Some(s),
            _ => None,
        }
    }

    /// Check whether a function context is active
    pub fn is_none(&self) -> bool {
        matches!(self.inner, FunctionType::None)
    }

    /// Clear context, executing drop if required
    #[cfg_attr(feature = "noinline", inline(never))]
    pub fn clear(&mut self) {
        self.inner = FunctionType::None;
    }
}

#[cfg(test)]
mod test {
    use super::Function;
    use crate::engine::{legacy::LegacySigner, prev::PrevTxVerifier};

    fn prev_init(f: &mut Function) {
        f.prev_tx_init(PrevTxVerifier::new([0xab; 32], 1, Some(1000)));
        assert!(f.prev_tx_ref().is_some());
    }

    fn legacy_init(f: &mut Function) {
        f.legacy_signer_init(LegacySigner::new(0, 2, 2));
        assert!(f.legacy_signer().is_some());
    }

    fn clear(f: &mut Function) {
        f.clear();
        assert!(f.is_none());
    }

    /// Function init / state changes
    #[test]
    fn function_states() {
        let mut f = Function::new();

        let states = &[prev_init, legacy_init, clear];

        for i in 0..states.len() {
            for j in 0..states.len() {
                states[i](&mut f);
                states[j](&mut f);
            }
        }
    }
}
