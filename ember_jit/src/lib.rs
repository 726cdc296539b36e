//! Speculative-optimization core of the Ember JIT compiler.
//!
//! - Sea-of-Nodes IR with an arena graph and fixed control chains
//! - Global code scheduling over a dominator-based CFG
//! - Guard lowering into explicit branch-and-deoptimize control flow
//! - Runtime assumption tracking with safe invalidation of installed code
#![deny(unsafe_op_in_unsafe_fn)]
pub mod ir;
pub mod opt;
pub mod runtime;
