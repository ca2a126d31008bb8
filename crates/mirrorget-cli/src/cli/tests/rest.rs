//! Tests for probe, servers and dest.

use super::parse;
use crate::cli::{Cli, CliCommand, ServersCommand};
use clap::Parser;

#[test]
fn cli_parse_probe() {
    match parse(&["mirrorget", "probe", "x/y.bin", "--server", "http://m/"]) {
        CliCommand::Probe { path, servers } => {
            assert_eq!(path, "x/y.bin");
            assert_eq!(servers, vec!["http://m/".to_string()]);
        }
        _ => panic!("expected Probe"),
    }
}

#[test]
fn cli_parse_servers_list() {
    match parse(&["mirrorget", "servers", "list"]) {
        CliCommand::Servers {
            command: ServersCommand::List,
        } => {}
        _ => panic!("expected Servers List"),
    }
}

#[test]
fn cli_parse_servers_set() {
    match parse(&["mirrorget", "servers", "set", "http://a/", "http://b/pub"]) {
        CliCommand::Servers {
            command: ServersCommand::Set { urls },
        } => assert_eq!(urls, vec!["http://a/".to_string(), "http://b/pub".to_string()]),
        _ => panic!("expected Servers Set"),
    }
}

#[test]
fn cli_parse_servers_set_needs_urls() {
    assert!(Cli::try_parse_from(["mirrorget", "servers", "set"]).is_err());
}

#[test]
fn cli_parse_dest() {
    match parse(&["mirrorget", "dest", "store/app.deb"]) {
        CliCommand::Dest { path } => assert_eq!(path, "store/app.deb"),
        _ => panic!("expected Dest"),
    }
}

#[test]
fn cli_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["mirrorget", "pause"]).is_err());
}
