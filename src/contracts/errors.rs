//! Custom errors commonly raised by the business contracts behind the engine
//!
//! Decoded by the normalizer to turn revert blobs into readable reasons.

alloy::sol! {
    /// Known revert errors
    #[derive(Debug)]
    contract KnownErrors {
        // OpenZeppelin access control / security
        error OwnableUnauthorizedAccount(address account);
        error AccessControlUnauthorizedAccount(address account, bytes32 neededRole);
        error EnforcedPause();
        error ReentrancyGuardReentrantCall();
        error SafeERC20FailedOperation(address token);

        // OpenZeppelin ERC-20 (ERC-6093)
        error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
        error ERC20InsufficientAllowance(address spender, uint256 allowance, uint256 needed);
        error ERC20InvalidReceiver(address receiver);

        // Identity linking
        error AlreadyLinked(address smartAccount, address eoa);
    }
}
