pub mod account;
pub mod autotrade_log;
pub mod candle;
pub mod notification;
pub mod position;
pub mod screening;
pub mod symbol;
pub mod trade;

pub use account::*;
pub use autotrade_log::*;
pub use candle::*;
pub use notification::*;
pub use position::*;
pub use screening::*;
pub use symbol::*;
pub use trade::*;
