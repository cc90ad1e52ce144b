//! Smart account, account factory and EntryPoint bindings

use alloy::sol;

sol! {
    /// Smart account execution interface (thirdweb / SimpleAccount style)
    #[sol(rpc)]
    interface ISmartAccount {
        /// Execute a single call from the account
        function execute(address _target, uint256 _value, bytes _calldata) external;

        /// Execute several calls atomically from the account
        function executeBatch(address[] _target, uint256[] _value, bytes[] _calldata) external;
    }

    /// Account factory used to derive counterfactual addresses
    #[sol(rpc)]
    interface IAccountFactory {
        /// Predict the account address for an admin signer
        function getAddress(address _adminSigner, bytes _data) external view returns (address);

        /// Deploy the account for an admin signer
        function createAccount(address _admin, bytes _data) external returns (address);
    }

    /// ERC-4337 EntryPoint (v0.6)
    #[sol(rpc)]
    interface IEntryPoint {
        /// Next nonce for a sender under a nonce key
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}
