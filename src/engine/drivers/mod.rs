// SPDX-License-Identifier: Apache-2.0

// Source database drivers

pub mod sqlserver;
