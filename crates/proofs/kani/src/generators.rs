//! Generators for arbitrary seeds (for Kani)

#[cfg(kani)]
use kani::any;
#[cfg(kani)]
use crate::sanitizer::{HolderSeed, TokenSeed, N_HOLDERS};
#[cfg(kani)]
use arrayvec::ArrayVec;

/// Whole-token bound per generated amount; small for fast SAT solving
pub const MAX_VAL: u128 = 100;

#[cfg(kani)]
pub fn any_amount() -> u128 {
    let raw: u8 = any();
    (raw as u128) % MAX_VAL
}

#[cfg(kani)]
pub fn any_holder_seed() -> HolderSeed {
    HolderSeed {
        tokens: any_amount().max(1),
        opted_out: any(),
    }
}

#[cfg(kani)]
pub fn any_token_seed() -> TokenSeed {
    let mut holders: ArrayVec<HolderSeed, N_HOLDERS> = ArrayVec::new();
    let count: u8 = any();
    for _ in 0..((count as usize) % N_HOLDERS + 1) {
        let _ = holders.try_push(any_holder_seed());
    }

    TokenSeed {
        holders,
        new_value: any_amount() * 3,
    }
}
