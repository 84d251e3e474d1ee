use s370_mmu::{InvalidAddress, TranslateFault};

/// Program interruption. Handlers propagate these with `?`; the dispatcher
/// turns them into a PSW swap through the program old/new pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("operation exception")]
    Operation,
    #[error("privileged-operation exception")]
    Privileged,
    #[error("execute exception")]
    Execute,
    #[error("protection exception")]
    Protection,
    #[error("addressing exception")]
    Addressing,
    #[error("specification exception")]
    Specification,
    #[error("data exception")]
    Data,
    #[error("fixed-point overflow exception")]
    FixedOverflow,
    #[error("fixed-point divide exception")]
    FixedDivide,
    #[error("decimal overflow exception")]
    DecimalOverflow,
    #[error("decimal divide exception")]
    DecimalDivide,
    #[error("exponent overflow exception")]
    ExponentOverflow,
    #[error("exponent underflow exception")]
    ExponentUnderflow,
    #[error("significance exception")]
    Significance,
    #[error("floating-point divide exception")]
    FloatDivide,
    #[error("segment-translation exception")]
    Segment,
    #[error("page-translation exception")]
    Page,
    #[error("special-operation exception")]
    SpecialOperation,
    #[error("monitor event")]
    Monitor,
}

/// PER event flag OR-ed into the program interruption code.
pub const IRC_PER: u16 = 0x0080;

impl Exception {
    /// 16-bit program interruption code.
    pub fn code(self) -> u16 {
        match self {
            Exception::Operation => 0x0001,
            Exception::Privileged => 0x0002,
            Exception::Execute => 0x0003,
            Exception::Protection => 0x0004,
            Exception::Addressing => 0x0005,
            Exception::Specification => 0x0006,
            Exception::Data => 0x0007,
            Exception::FixedOverflow => 0x0008,
            Exception::FixedDivide => 0x0009,
            Exception::DecimalOverflow => 0x000A,
            Exception::DecimalDivide => 0x000B,
            Exception::ExponentOverflow => 0x000C,
            Exception::ExponentUnderflow => 0x000D,
            Exception::Significance => 0x000E,
            Exception::FloatDivide => 0x000F,
            Exception::Segment => 0x0010,
            Exception::Page => 0x0011,
            Exception::SpecialOperation => 0x0013,
            Exception::Monitor => 0x0040,
        }
    }

    /// True for the suppress/nullify class: the PSW instruction address is
    /// backed up to the start of the interrupted instruction. Arithmetic
    /// exceptions and monitor events complete instead.
    pub fn restarts(self) -> bool {
        matches!(
            self,
            Exception::Operation
                | Exception::Privileged
                | Exception::Execute
                | Exception::Protection
                | Exception::Addressing
                | Exception::Specification
                | Exception::Segment
                | Exception::Page
                | Exception::SpecialOperation
        )
    }
}

impl From<TranslateFault> for Exception {
    fn from(fault: TranslateFault) -> Self {
        match fault {
            TranslateFault::Segment => Exception::Segment,
            TranslateFault::Page => Exception::Page,
            TranslateFault::Specification => Exception::Specification,
            TranslateFault::Addressing => Exception::Addressing,
            TranslateFault::Protection => Exception::Protection,
        }
    }
}

impl From<InvalidAddress> for Exception {
    fn from(_: InvalidAddress) -> Self {
        Exception::Addressing
    }
}
