//! Domain types for SetupLab

pub mod bar;
pub mod ids;
pub mod resolution;
pub mod session;
pub mod trade;

pub use bar::Bar;
pub use ids::TradeId;
pub use resolution::Resolution;
pub use session::Session;
pub use trade::{
    price_order_holds, CommissionBreakdown, ExecutionDiagnostics, ExitReason, Outcome, RawTrade, RestingLimit,
    SetupDetail, SetupKind, Side, SimulatedTrade, VolatilityRegime,
};
