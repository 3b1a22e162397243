use thiserror::Error;

/// Every failure aborts the whole operation; there is no partial success.
/// Messages keep the protocol's classic short revert codes where one exists.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    #[error("LOK")]
    Locked,
    #[error("AI")]
    AlreadyInitialized,

    #[error("TLU")]
    TickLowerNotBelowUpper,
    #[error("TLM")]
    TickLowerOverflow,
    #[error("TUM")]
    TickUpperOverflow,
    #[error("tick % tick_spacing must be zero")]
    TickAndSpacingNotMatch,
    #[error("T")]
    TickOutOfBounds,
    #[error("R")]
    SqrtPriceOutOfBounds,

    #[error("Minting amount should be greater than 0")]
    ZeroMintAmount,
    #[error("LO")]
    LiquidityGrossOverflow,
    #[error("LS")]
    LiquiditySubValueErr,
    #[error("LA")]
    LiquidityAddValueErr,
    #[error("NP")]
    NoPositionLiquidity,

    #[error("AS")]
    ZeroAmountSpecified,
    #[error("SPL")]
    SqrtPriceLimitOverflow,
    #[error("IIA")]
    InsufficientInputAmount,
    #[error("M0")]
    InsufficientPayment0,
    #[error("M1")]
    InsufficientPayment1,

    #[error("L")]
    FlashNoLiquidity,
    #[error("F0")]
    FlashRepay0,
    #[error("F1")]
    FlashRepay1,

    #[error("I")]
    OracleUninitialized,
    #[error("OLD")]
    OracleTargetTooOld,
    #[error("tick not initialized")]
    TickNotInitialized,

    #[error("Not approved")]
    NotApproved,
    #[error("invalid protocol fee value")]
    InvalidFeeProtocol,
    #[error("invalid pool config")]
    InvalidPoolConfig,

    #[error("math overflow")]
    CalculateOverflow,
    #[error("token transfer failed")]
    TransferFailed,
    #[error("callback failed")]
    CallbackFailed,
}
