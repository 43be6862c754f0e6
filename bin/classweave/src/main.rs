mod dump;

use classweave::jvm::*;

use clap::{Arg, ArgAction, Command};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("Class file rewriter")
        .version(clap::crate_version!())
        .about("Read a JVM class file and write it back, recomputing stack maps")
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("FILE")
                .required(false)
                .help("Write the re-encoded class to this file"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .value_name("MODE")
                .value_parser(["auto", "max-stack", "frames"])
                .default_value("auto")
                .help("What to compute for method bodies"),
        )
        .arg(
            Arg::new("classpath")
                .long("classpath")
                .value_name("DIR")
                .action(ArgAction::Append)
                .help("Directory of class files whose superclasses are used when merging types"),
        )
        .arg(
            Arg::new("copy-pool")
                .long("copy-pool")
                .action(ArgAction::SetTrue)
                .help("Keep the original constant pool and copy unchanged methods as they are"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .action(ArgAction::SetTrue)
                .help("Print the structure of the class instead of rewriting it"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input class file to use")
                .required(true)
                .index(1),
        )
        .get_matches();

    let input = matches
        .get_one::<String>("INPUT")
        .expect("INPUT is required");
    log::info!("Reading '{}'", input);
    let bytes = fs::read(input)?;
    let reader = ClassReader::new(&bytes)?;

    if matches.get_flag("dump") {
        return reader.accept(&mut dump::Dump, ReaderFlags::default());
    }

    let frames = matches
        .get_one::<String>("frames")
        .and_then(|mode| mode.parse::<FrameComputation>().ok())
        .unwrap_or_default();
    let options = WriterOptions { frames };

    let mut hierarchy = SuperClassMap::with_java_lang();
    if let Some(directories) = matches.get_many::<String>("classpath") {
        for directory in directories {
            load_class_path(Path::new(directory), &mut hierarchy)?;
        }
    }

    let mut writer = if matches.get_flag("copy-pool") {
        ClassWriter::from_reader(&reader, options, hierarchy)?
    } else {
        ClassWriter::with_hierarchy(options, hierarchy)
    };
    reader.accept(&mut writer, ReaderFlags::default())?;
    let class_bytes = writer.to_bytes()?;

    match matches.get_one::<String>("output") {
        Some(output) => {
            log::info!("Writing '{}' ({} bytes)", output, class_bytes.len());
            fs::write(output, &class_bytes)?;
        }
        None => println!(
            "{}: {} bytes read, {} bytes re-encoded",
            input,
            bytes.len(),
            class_bytes.len()
        ),
    }

    Ok(())
}

/// Record the superclass of every class file under `directory`
fn load_class_path(directory: &Path, hierarchy: &mut SuperClassMap) -> Result<(), Error> {
    let class_files = WalkDir::new(directory)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "class"));

    let mut loaded = 0;
    for class_file in class_files {
        let bytes = fs::read(&class_file)?;
        match hierarchy.add_class_file(&bytes) {
            Ok(_) => loaded += 1,
            Err(err) => log::warn!("Skipping '{}': {}", class_file.display(), err),
        }
    }
    log::info!("Loaded {} classes from '{}'", loaded, directory.display());
    Ok(())
}
