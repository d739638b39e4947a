//! Solidity bindings for the gasless batch path.

use alloy::sol;

sol! {
    /// Batch-executor implementation an account delegates to for sponsored
    /// execution. Calls run in array order and revert together.
    interface IBatchExecutor {
        struct Call {
            address target;
            uint256 value;
            bytes data;
        }

        function executeBatch(Call[] calldata calls) external payable;
    }
}
