use clap::{arg,crate_version,ArgGroup,Command};
use std::path::Path;
use lzwar::{archive,files};
use lzwar::archive::DamagePolicy;

const RCH: &str = "unreachable was reached";

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let long_help =
"Examples:
---------
Pack:      `lzwar compress arch.lzw notes.txt projects/`
Unpack:    `lzwar decompress arch.lzw -d restored -r`
List:      `lzwar listing arch.lzw -v`";

    let mut main_cmd = Command::new("lzwar")
        .about("Bundle files into an LZW archive and restore them")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(<archive_name> "archive to create"))
        .arg(arg!(<to_compress> ... "files and directories to pack"))
        .about("pack files and directories into an archive"));

    main_cmd = main_cmd.subcommand(Command::new("decompress")
        .arg(arg!(<archive_name> "archive to unpack"))
        .arg(arg!(-d --dir <DIR> "output directory").required(false).default_value("."))
        .arg(arg!(-r --"restore-metadata" "restore mode and timestamps of unpacked files"))
        .arg(arg!(-i --"ignore-damage" "unpack every file, keeping damaged ones"))
        .arg(arg!(-a --"archive-not-damage" "unpack only if the whole archive is undamaged"))
        .arg(arg!(-f --"files-not-damage" "unpack only undamaged files"))
        .group(ArgGroup::new("policy").args(["ignore-damage","archive-not-damage","files-not-damage"]))
        .about("unpack an archive"));

    main_cmd = main_cmd.subcommand(Command::new("listing")
        .arg(arg!(<archive_name> "archive to inspect"))
        .arg(arg!(-v --verbose "per-entry compression rate and sizes"))
        .about("list the files in an archive"));

    let matches = main_cmd.get_matches();

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let archive_name = cmd.get_one::<String>("archive_name").expect(RCH);
        let args: Vec<String> = cmd.get_many::<String>("to_compress").expect(RCH).cloned().collect();
        let inputs = files::gather_inputs(&args)?;
        archive::pack(Path::new(archive_name),&inputs)?;
    }

    if let Some(cmd) = matches.subcommand_matches("decompress") {
        let archive_name = cmd.get_one::<String>("archive_name").expect(RCH);
        let dir = cmd.get_one::<String>("dir").expect(RCH);
        let policy = match (cmd.get_flag("archive-not-damage"),cmd.get_flag("files-not-damage")) {
            (true,_) => DamagePolicy::RejectArchive,
            (_,true) => DamagePolicy::RejectFiles,
            _ => DamagePolicy::Ignore
        };
        archive::unpack(Path::new(archive_name),Path::new(dir),cmd.get_flag("restore-metadata"),policy)?;
    }

    if let Some(cmd) = matches.subcommand_matches("listing") {
        let archive_name = cmd.get_one::<String>("archive_name").expect(RCH);
        let headers = archive::list_headers(Path::new(archive_name))?;
        if cmd.get_flag("verbose") {
            println!("{:<32} {:>8} {:>16} {:>14}","NAME","RATE (%)","COMPRESSED (kB)","ORIGINAL (kB)");
            for header in &headers {
                let rate = match header.size {
                    0 => 0,
                    size => ((1.0 - header.c_size as f64 / size as f64) * 100.0) as i64
                };
                println!("{:<32} {:>8} {:>16.1} {:>14.1}",
                    header.display_path(),
                    rate,
                    header.c_size as f64 / 1024.0,
                    header.size as f64 / 1024.0);
            }
        } else {
            for header in &headers {
                println!("{}",header.display_path());
            }
        }
    }

    Ok(())
}
