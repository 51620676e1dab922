// evm-bridge/src/testing.rs

//! Fixtures shared by unit tests: a tiny hand-assembled storage contract
//! with `constructor(uint256)`, `set(uint256)` and `get() returns (uint256)`

use crate::ContractDescriptor;

pub const STORAGE_ABI: &str = r#"[
    {"type":"constructor","stateMutability":"nonpayable",
     "inputs":[{"name":"initial","type":"uint256"}]},
    {"type":"function","name":"set","stateMutability":"nonpayable",
     "inputs":[{"name":"x","type":"uint256"}],"outputs":[]},
    {"type":"function","name":"get","stateMutability":"view",
     "inputs":[],"outputs":[{"name":"","type":"uint256"}]}
]"#;

/// Dispatches on the selector; unknown selectors revert with empty data
pub const STORAGE_RUNTIME: &str = "60003560e01c806360fe47b114601e5780636d4ce63c14602657600080fd5b600435600055005b60005460005260206000f3";

/// Stores the trailing 32-byte constructor argument in slot 0 and returns
/// the runtime code
pub const STORAGE_INIT_CODE: &str = concat!(
    "60206020380360003960005160005560328060",
    "1a",
    "6000396000f3",
    "60003560e01c806360fe47b114601e5780636d4ce63c14602657600080fd5b600435600055005b60005460005260206000f3",
);

pub fn storage_descriptor() -> ContractDescriptor {
    ContractDescriptor::new("Storage", STORAGE_ABI, STORAGE_INIT_CODE).unwrap()
}
