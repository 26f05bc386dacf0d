use alloy_sol_types::sol;

// Mirrors the on-chain HTLC bridge contract. The contract itself is out of
// scope (spec Non-goals); this binding exists only so the relay can encode
// calls and decode logs/return data with the exact same ABI the contract
// uses. `transferOut` is user-called — the relay never sends it — but the
// binding carries it anyway so log decoding and the four mutators stay one
// coherent interface instead of two half-ABIs.
sol! {
    #[derive(Debug)]
    interface IHtlcBridge {
        function transferOut(
            bytes32 transferId,
            address token,
            uint256 amount,
            address receiver,
            address dstAddress,
            bytes32 hashlock,
            uint64 timelock,
            uint64 dstChainId
        ) external;

        function transferIn(
            bytes32 transferId,
            address token,
            uint256 amount,
            address sender,
            address receiver,
            bytes32 hashlock,
            uint64 timelock,
            uint64 srcChainId,
            bytes32 srcTransferId
        ) external;

        function confirm(bytes32 transferId, bytes32 preimage) external;

        function refund(bytes32 transferId) external;

        function transfers(bytes32 transferId) external view returns (uint8 status);

        event LogNewTransferOut(
            bytes32 indexed transferId,
            address sender,
            address receiver,
            address dstAddress,
            address token,
            uint256 amount,
            bytes32 hashlock,
            uint64 timelock,
            uint64 dstChainId
        );

        event LogNewTransferIn(
            bytes32 indexed transferId,
            address sender,
            address receiver,
            address token,
            uint256 amount,
            bytes32 hashlock,
            uint64 timelock,
            uint64 srcChainId,
            bytes32 srcTransferId
        );

        event LogConfirm(bytes32 indexed transferId, bytes32 preimage);

        event LogRefund(bytes32 indexed transferId);
    }
}

// Minimal ERC-20 surface needed for the relay's own approval bootstrap — the
// relay must hold an allowance on each token it locks into the bridge
// contract before its first transferIn/confirm can land.
sol! {
    #[derive(Debug)]
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}
