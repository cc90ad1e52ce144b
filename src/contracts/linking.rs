//! Identity linking bindings

use alloy::sol;

sol! {
    /// Capability exposed by contracts that treat an EOA and its smart account
    /// as a single logical user
    #[sol(rpc)]
    interface IIdentityLink {
        /// EOA that controls a smart account (zero when unlinked)
        function linkedEoa(address smartAccount) external view returns (address);

        /// Record `msg.sender` as the controller of `smartAccount`
        function linkSmartAccount(address smartAccount) external;

        /// Emitted once a link is recorded
        event SmartAccountLinked(address indexed eoa, address indexed smartAccount);
    }
}
