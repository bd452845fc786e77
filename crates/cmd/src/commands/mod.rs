// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

pub mod bler;
pub mod describe;
pub mod events;
pub mod fail_reasons;
pub mod hist;
pub mod trend;

pub use bler::bler_command;
pub use describe::describe_command;
pub use events::events_command;
pub use fail_reasons::fail_reasons_command;
pub use hist::hist_command;
pub use trend::trend_command;
