use clap::{value_parser, crate_version, Arg, ArgAction, ArgGroup, Command, ValueHint};

const DIMG_HELP: &str = "the card image is a raw dump, with or without ECC,
of an 8, 16, 32, or 64 MB card; the layout is inferred from the file size";
const GLOB_HELP: &str = "save names are matched with glob patterns, e.g. `BASLUS-*`,
delimiters like quotes may be needed to keep the shell from expanding them";

fn dimg_arg() -> Arg {
    Arg::new("dimg").short('d').long("dimg").help("path to card image itself")
        .value_name("PATH")
        .value_hint(ValueHint::FilePath)
        .required(true)
}

fn indent_arg() -> Arg {
    Arg::new("indent").long("indent").help("JSON indentation, omit to minify")
        .value_name("SPACES")
        .value_parser(value_parser!(u16).range(0..16))
        .required(false)
}

fn format_arg() -> Arg {
    Arg::new("type").short('t').long("type").help("save container format")
        .value_name("FORMAT")
        .value_parser(["cbs","psu"])
        .required(false)
}

pub fn build_cli() -> Command {
    let long_help = "ps2kit is always invoked with exactly one of several subcommands.
Subcommands that change the card write the image back in place.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
create card image:     `ps2kit mkcard -d card.ps2`
list saves:            `ps2kit ls -d card.ps2`
import saves:          `ps2kit import -d card.ps2 mysave.cbs other.psu`
export saves:          `ps2kit export -d card.ps2 -l 'BASLUS-*'`
remove ECC:            `ps2kit ecc --strip -d card.ps2 -o card.bin`";

    let mut main_cmd = Command::new("ps2kit")
        .about("Manipulates PS2 memory card images and save files.")
        .after_long_help(long_help)
        .version(crate_version!());

    main_cmd = main_cmd.subcommand(
        Command::new("mkcard")
            .arg(dimg_arg().help("card image path to create"))
            .arg(Arg::new("size").short('s').long("size").help("card capacity in MB")
                .value_name("MB")
                .value_parser(["8","16","32","64"])
                .default_value("8"))
            .arg(Arg::new("no-ecc").long("no-ecc").help("omit the ECC spare area").action(ArgAction::SetTrue))
            .about("write a freshly formatted card image to the given path")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("ls")
            .arg(dimg_arg())
            .arg(Arg::new("save").short('f').long("file").help("save directory to list").value_name("SAVE")
                .required(false))
            .about("list saves on a card, or the files in one save")
            .visible_alias("dir")
            .after_help(DIMG_HELP)
    );
    main_cmd = main_cmd.subcommand(
        Command::new("df")
            .arg(dimg_arg())
            .about("show free and allocatable space")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("stat")
            .arg(dimg_arg())
            .arg(indent_arg())
            .about("write superblock fields as a JSON string to stdout")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("import")
            .arg(dimg_arg())
            .arg(Arg::new("paths").num_args(1..).help("save files to import").value_name("PATHS")
                .value_hint(ValueHint::FilePath)
                .required(true))
            .arg(Arg::new("overwrite").short('o').long("overwrite").help("replace saves that already exist")
                .action(ArgAction::SetTrue))
            .about("import save files into a card image, the format is detected from content")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("export")
            .arg(dimg_arg())
            .arg(Arg::new("patterns").num_args(1..).help("saves to export").value_name("PATTERNS")
                .required(true))
            .arg(format_arg())
            .arg(Arg::new("longnames").short('l').long("longnames").help("name files after the save title")
                .action(ArgAction::SetTrue))
            .arg(Arg::new("outdir").long("dir").help("output directory").value_name("DIR")
                .value_hint(ValueHint::DirPath)
                .default_value("."))
            .about("export saves from a card image to save files")
            .after_help(GLOB_HELP)
    );
    main_cmd = main_cmd.subcommand(
        Command::new("delete")
            .arg(dimg_arg())
            .arg(Arg::new("saves").num_args(1..).help("saves to delete").value_name("SAVES")
                .required(true))
            .about("delete saves from a card image")
            .visible_alias("del")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("check")
            .arg(dimg_arg())
            .about("check the file system and repair what can be repaired")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("ecc")
            .arg(dimg_arg())
            .arg(Arg::new("add").long("add").help("add ECC").action(ArgAction::SetTrue))
            .arg(Arg::new("strip").long("strip").help("strip ECC").action(ArgAction::SetTrue))
            .group(ArgGroup::new("op").args(["add","strip"]).required(true))
            .arg(Arg::new("output").short('o').long("output").help("path of converted image, default is in place")
                .value_name("PATH")
                .value_hint(ValueHint::FilePath)
                .required(false))
            .about("add or strip the ECC spare area of a card image")
    );
    main_cmd = main_cmd.subcommand(
        Command::new("completions")
            .arg(
                Arg::new("shell").short('s').long("shell").help("shell target").value_name("NAME")
                    .required(true)
                    .value_parser(["bash","elv","fish","ps1","zsh"])
            )
            .about("write completions script to stdout for the specified shell")
    );
    return main_cmd;
}
