// evm-bridge/src/descriptor.rs

use crate::{BridgeError, BridgeResult};
use ethers_core::abi::{Abi, Token};
use revm::primitives::Address;
use std::fmt;

/// A compiled contract: its interface, its creation bytecode and, once
/// deployed, its address
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    name: String,
    abi: Abi,
    bytecode: Vec<u8>,
    address: Option<Address>,
}

impl ContractDescriptor {
    /// Build a descriptor from a JSON ABI and hex creation bytecode
    pub fn new(name: &str, abi_json: &str, bytecode_hex: &str) -> BridgeResult<Self> {
        let abi: Abi = serde_json::from_str(abi_json)
            .map_err(|e| BridgeError::Decoding(format!("interface of {name}: {e}")))?;

        let bytecode = hex::decode(bytecode_hex.trim().trim_start_matches("0x"))
            .map_err(|e| BridgeError::Decoding(format!("bytecode of {name}: {e}")))?;
        if bytecode.is_empty() {
            return Err(BridgeError::Decoding(format!("bytecode of {name} is empty")));
        }

        Ok(Self {
            name: name.to_string(),
            abi,
            bytecode,
            address: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Address assigned by a successful deploy
    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn is_deployed(&self) -> bool {
        self.address.is_some()
    }

    pub fn deployed_address(&self) -> BridgeResult<Address> {
        self.address
            .ok_or_else(|| BridgeError::NotDeployed(self.name.clone()))
    }

    pub(crate) fn set_address(&mut self, address: Address) {
        self.address = Some(address);
    }

    /// ABI-encode constructor arguments (without the bytecode)
    pub fn pack_constructor(&self, args: &[Token]) -> BridgeResult<Vec<u8>> {
        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(Vec::new(), args)
                .map_err(|e| BridgeError::Encoding(format!("constructor of {}: {e}", self.name))),
            None if args.is_empty() => Ok(Vec::new()),
            None => Err(BridgeError::Encoding(format!(
                "{} has no constructor but {} argument(s) were given",
                self.name,
                args.len()
            ))),
        }
    }

    /// Bytecode followed by the encoded constructor arguments
    pub fn creation_payload(&self, args: &[Token]) -> BridgeResult<Vec<u8>> {
        let mut payload = self.bytecode.clone();
        payload.extend(self.pack_constructor(args)?);
        Ok(payload)
    }

    /// Selector plus ABI-encoded arguments of `method`
    pub fn pack_method(&self, method: &str, args: &[Token]) -> BridgeResult<Vec<u8>> {
        let function = self
            .abi
            .function(method)
            .map_err(|e| BridgeError::Encoding(format!("{}.{method}: {e}", self.name)))?;
        function
            .encode_input(args)
            .map_err(|e| BridgeError::Encoding(format!("{}.{method}: {e}", self.name)))
    }

    /// Decode what `method` returned into its declared output types
    pub fn unpack_result(&self, method: &str, raw: &[u8]) -> BridgeResult<Vec<Token>> {
        let function = self
            .abi
            .function(method)
            .map_err(|e| BridgeError::Decoding(format!("{}.{method}: {e}", self.name)))?;
        function
            .decode_output(raw)
            .map_err(|e| BridgeError::Decoding(format!("{}.{method} output: {e}", self.name)))
    }
}

impl fmt::Display for ContractDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "EvmContract[{} @{}]", self.name, address),
            None => write!(f, "EvmContract[{} undeployed]", self.name),
        }
    }
}
