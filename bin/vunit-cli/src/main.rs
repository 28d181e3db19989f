//! `vunit` command-line tool.
//!
//! Hosts interactive virtualization-unit sessions over stdin/stdout and composes bytecode
//! templates offline.

use clap::Parser;
use vunit_cli::{Error, MainCmd};

fn main() -> Result<(), Error> {
    set_thread_panic_hook();
    MainCmd::parse().run().inspect_err(|e| eprintln!("{e:?}"))
}

/// Sets thread panic hook, so a panic on any task ends the process.
fn set_thread_panic_hook() {
    use std::{
        backtrace::Backtrace,
        panic::{set_hook, take_hook},
        process::exit,
    };
    let orig_hook = take_hook();
    set_hook(Box::new(move |panic_info| {
        eprintln!("Custom backtrace: {}", Backtrace::capture());
        orig_hook(panic_info);
        exit(1);
    }));
}
