// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module

mod address_blocks;
mod dependency_order;
mod naming;
mod pipeline_order;
