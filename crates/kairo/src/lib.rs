#![doc = include_str!("../../../README.md")]
// first so the value/heap pair sit together at the top of the docs
mod heap;

mod ast;
mod builtins;
mod cps;
mod engine;
mod eval;
mod exception;
mod fold;
mod generator;
mod host;
mod intern;
mod iterator;
mod lexer;
mod lower;
mod parse;
mod prepare;
mod promise;
mod scheduler;
mod scope;
mod sexpr;
mod value;

pub use crate::{
    engine::{Engine, EngineLimits},
    exception::{EngineError, ExcKind, Exception, ParseError},
    heap::HeapStats,
    host::{DebugMessage, ExceptionEvent, HostCallable, HostValue},
    scheduler::HostTask,
};
