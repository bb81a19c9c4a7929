/********************************************************************************
 * Copyright (c) 2026 Contributors to the Fleetboard project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Data-plane layer.
//!
//! Owns the bounded ingress queue between transport callbacks and dispatch,
//! and the dispatch pass that fans one dequeued message out to the buffer
//! store and every listener of the owning subscription. Backpressure policy
//! (drop oldest, with accounting) and per-listener fault isolation live here.

pub(crate) mod dispatch;
pub(crate) mod ingress;
