//! ERC-4337 v0.6 user operation

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

sol! {
    /// Field layout hashed into the user operation hash
    struct PackedUserOpFields {
        address sender;
        uint256 nonce;
        bytes32 initCodeHash;
        bytes32 callDataHash;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes32 paymasterAndDataHash;
    }
}

/// User operation as sent over the bundler JSON-RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Unsigned operation with zeroed gas fields
    pub fn new(sender: Address, nonce: U256, init_code: Bytes, call_data: Bytes) -> Self {
        Self {
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit: U256::ZERO,
            verification_gas_limit: U256::ZERO,
            pre_verification_gas: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        }
    }

    /// Hash signed by the owner (EntryPoint v0.6 `getUserOpHash`)
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = PackedUserOpFields {
            sender: self.sender,
            nonce: self.nonce,
            initCodeHash: keccak256(&self.init_code),
            callDataHash: keccak256(&self.call_data),
            callGasLimit: self.call_gas_limit,
            verificationGasLimit: self.verification_gas_limit,
            preVerificationGas: self.pre_verification_gas,
            maxFeePerGas: self.max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas,
            paymasterAndDataHash: keccak256(&self.paymaster_and_data),
        }
        .abi_encode();

        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// Sign the operation hash as an EIP-191 personal message
    pub fn sign(
        &mut self,
        signer: &PrivateKeySigner,
        entry_point: Address,
        chain_id: u64,
    ) -> alloy::signers::Result<()> {
        let hash = self.hash(entry_point, chain_id);
        let signature = signer.sign_message_sync(hash.as_slice())?;
        self.signature = Bytes::from(signature.as_bytes().to_vec());
        Ok(())
    }
}
