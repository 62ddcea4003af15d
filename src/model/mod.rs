//! # Call Model
//!
//! The entities that flow through the rest of the crate: `CallScheduleItem`
//! and `CallRecord` (`spec.md` §3), the `CallType`/`CallStatus` enums with
//! their tolerant parsing and transition rules (§4.B, §4.C), the timing
//! grammar parser, and the discharge-side inputs (`DischargeInstruction`,
//! `DischargeOrder`) that the Scheduler and Transcript Analyzer consume.
//!
//! Everything here is plain data plus pure functions — no storage, no I/O.
//! `CallScheduleItem::to_dict`/`from_dict` describe the flat-hash encoding
//! the `store` module persists, but `model` itself never touches `sled`.

mod call_record;
mod call_schedule_item;
mod call_status;
mod call_type;
mod discharge_instruction;
mod discharge_order;
mod timing;

pub use call_record::CallRecord;
pub use call_schedule_item::CallScheduleItem;
pub use call_status::CallStatus;
pub use call_type::CallType;
pub use discharge_instruction::{DischargeInstruction, InstructionCategory};
pub use discharge_order::{CallTemplate, DischargeOrder};
pub use timing::TimingSpec;
