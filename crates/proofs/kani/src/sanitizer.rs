//! State space sanitizer - bounds seeds for Kani exploration

use arrayvec::ArrayVec;
use vault_core::{HolderId, SupplyToken, CREDITS_RESOLUTION};

pub const N_HOLDERS: usize = 3;
pub const MAX_STEPS: u8 = 4;

/// Bounds for tractable verification (whole tokens)
const MAX_MINT: u128 = 1_000_000;
const MAX_VALUE: u128 = 10_000_000;

/// One holder's starting position
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HolderSeed {
    /// Whole tokens minted
    pub tokens: u128,
    pub opted_out: bool,
}

/// Inputs from which a token is built
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenSeed {
    pub holders: ArrayVec<HolderSeed, N_HOLDERS>,
    /// Backing value offered to rebase (whole tokens)
    pub new_value: u128,
}

pub trait Sanitize {
    fn sanitize(self) -> Self;
}

impl Sanitize for TokenSeed {
    fn sanitize(mut self) -> TokenSeed {
        for h in self.holders.iter_mut() {
            // Zero mints are rejected; keep every seed mintable
            h.tokens = (h.tokens % MAX_MINT).max(1);
        }
        self.new_value %= MAX_VALUE;
        self
    }
}

pub fn holder(i: usize) -> HolderId {
    HolderId::new(format!("h{}", i))
}

impl TokenSeed {
    /// Mint every seed holder, then opt out the flagged ones
    pub fn build(&self) -> SupplyToken {
        let mut token = SupplyToken::new();
        for (i, h) in self.holders.iter().enumerate() {
            if token.mint(&holder(i), h.tokens * CREDITS_RESOLUTION).is_err() {
                continue;
            }
            if h.opted_out {
                let _ = token.opt_out(&holder(i));
            }
        }
        token
    }

    pub fn new_value_canonical(&self) -> u128 {
        self.new_value * CREDITS_RESOLUTION
    }
}
