//! Contract interfaces the reader consumes.
//!
//! These mirror the deployed channel factory, channel mastercopy, transfer
//! registry, and transfer-definition contracts. Only the view surface is
//! declared; transaction submission goes through [`crate::sender`].

use alloy_sol_types::sol;
use strand_types::commitment::WithdrawCommitment;
use strand_types::{Balance, RegisteredTransfer};

sol! {
    #[sol(rpc)]
    interface IChannelFactory {
        function getChannelAddress(address alice, address bob) external view returns (address);
    }

    struct WithdrawDataSol {
        address channelAddress;
        address alice;
        address bob;
        address recipient;
        address assetId;
        uint256 amount;
        uint256 nonce;
        address callTo;
        bytes callData;
    }

    struct ChannelDisputeSol {
        bytes32 channelStateHash;
        uint256 nonce;
        bytes32 merkleRoot;
        uint256 consensusExpiry;
        uint256 defundExpiry;
    }

    #[sol(rpc)]
    interface IChannelMastercopy {
        function getTotalDepositsAlice(address assetId) external view returns (uint256);
        function getTotalDepositsBob(address assetId) external view returns (uint256);
        function getChannelDispute() external view returns (ChannelDisputeSol);
        function getWithdrawalTransactionRecord(WithdrawDataSol wd) external view returns (bool);
    }

    struct BalanceSol {
        uint256[2] amount;
        address[2] to;
    }

    #[sol(rpc)]
    interface ITransferDefinition {
        function create(bytes encodedBalance, bytes encodedState) external view returns (bool);
        function resolve(bytes encodedBalance, bytes encodedState, bytes encodedResolver) external view returns (BalanceSol);
    }

    struct RegisteredTransferSol {
        string name;
        address definition;
        string stateEncoding;
        string resolverEncoding;
        bytes encodedCancel;
    }

    #[sol(rpc)]
    interface ITransferRegistry {
        function getTransferDefinitions() external view returns (RegisteredTransferSol[]);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

impl From<RegisteredTransferSol> for RegisteredTransfer {
    fn from(value: RegisteredTransferSol) -> Self {
        RegisteredTransfer {
            name: value.name,
            definition: value.definition,
            state_encoding: value.stateEncoding,
            resolver_encoding: value.resolverEncoding,
            encoded_cancel: value.encodedCancel,
        }
    }
}

impl From<BalanceSol> for Balance {
    fn from(value: BalanceSol) -> Self {
        Balance {
            to: value.to,
            amount: value.amount,
        }
    }
}

impl From<&Balance> for BalanceSol {
    fn from(value: &Balance) -> Self {
        BalanceSol {
            amount: value.amount,
            to: value.to,
        }
    }
}

impl From<&WithdrawCommitment> for WithdrawDataSol {
    fn from(commitment: &WithdrawCommitment) -> Self {
        let data = commitment.withdraw_data();
        WithdrawDataSol {
            channelAddress: data.channelAddress,
            alice: data.alice,
            bob: data.bob,
            recipient: data.recipient,
            assetId: data.assetId,
            amount: data.amount,
            nonce: data.nonce,
            callTo: data.callTo,
            callData: data.callData,
        }
    }
}
