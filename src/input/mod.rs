//! Device-side drivers.
//!
//! Inputs mutate bridged devices from outside the stack thread; every change
//! reaches controllers through the report queue.

pub mod simulation;
