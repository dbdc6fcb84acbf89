// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod capture;
pub mod decode;
pub mod formats;
mod sinks;
