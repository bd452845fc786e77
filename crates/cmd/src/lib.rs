// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Batch command line over the scheduler log engine

pub mod commands;
pub mod common;
