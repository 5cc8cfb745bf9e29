/*
[INPUT]:  Subcommand arguments
[OUTPUT]: Interactive command implementations
[POS]:    CLI layer - module wiring
[UPDATE]: When adding interactive commands
*/

pub mod init;
