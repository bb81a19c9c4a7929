/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Control-plane layer.
//!
//! Owns subscription identity (structural keys and their canonical map form),
//! the refcounted subscription registry, and the reconnect/replay
//! coordinator. This layer is responsible for the dedup and refcount
//! invariants: one transport subscription per distinct key, torn down exactly
//! when the last listener detaches, suspended but retained across transport
//! outages.

pub(crate) mod reconnect;
pub(crate) mod registry;
pub(crate) mod subscription_key;
