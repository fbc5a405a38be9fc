use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};

use xvm_core::assembler::{self, IncludeResolver};
use xvm_core::config::Config;
use xvm_core::error::XvmError;
use xvm_core::executable::Executable;
use xvm_core::linker;
use xvm_core::loader;
use xvm_core::symtab::SymbolTable;
use xvm_core::reloc::RelocationTable;
use xvm_core::vm::Vm;

mod syscalls;

#[derive(ClapParser)]
#[command(name = "xvm", about = "Assembler, linker and interpreter for the xvm stack machine")]
struct Cli {
    /// Set a config key, e.g. -s pic=0
    #[arg(short = 's', long = "setopt", value_name = "KEY=VALUE")]
    setopt: Vec<String>,

    /// Output file for `compile`/`link`
    #[arg(short = 'o', long = "output", default_value = "out.xbin")]
    output: PathBuf,

    /// Extra `%include` search directory, may repeat
    #[arg(short = 'i', long = "include")]
    include: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information
    Version,
    /// Assemble a source file to an object file
    Compile { file: PathBuf },
    /// Load and run a previously-assembled object
    Run { file: PathBuf },
    /// Assemble and run a source file directly, without writing a file
    Runsrc { file: PathBuf },
    /// Print an object file's header, sections, and contents
    Dump { file: PathBuf },
    /// Link object files together
    Link { files: Vec<PathBuf> },
}

/// Resolves `%include` by searching the current directory first, then each
/// `-i` directory in the order given, per spec.md §4.3.
struct DirIncludeResolver {
    dirs: Vec<PathBuf>,
}

impl IncludeResolver for DirIncludeResolver {
    fn resolve(&mut self, name: &str) -> Option<(String, String)> {
        std::iter::once(PathBuf::from("."))
            .chain(self.dirs.iter().cloned())
            .find_map(|dir| {
                let path = dir.join(name);
                let content = std::fs::read_to_string(&path).ok()?;
                let canonical = std::fs::canonicalize(&path)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| path.to_string_lossy().into_owned());
                Some((canonical, content))
            })
    }
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::new();
    for setting in &cli.setopt {
        match setting.split_once('=') {
            Some((key, value)) => config.set(key, value),
            None => tracing::warn!("ignoring malformed -s '{setting}' (expected KEY=VALUE)"),
        }
    }
    config
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    let result = match &cli.command {
        Command::Version => {
            println!("xvm {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Compile { file } => compile(file, &cli.output, &cli.include, &config),
        Command::Run { file } => run(file, &config),
        Command::Runsrc { file } => runsrc(file, &cli.include, &config),
        Command::Dump { file } => dump(file),
        Command::Link { files } => link(files, &cli.output, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("usage error: {message}");
            ExitCode::from(255)
        }
        Err(CliError::Xvm(e)) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

enum CliError {
    Usage(String),
    Xvm(XvmError),
}

impl From<XvmError> for CliError {
    fn from(e: XvmError) -> Self {
        Self::Xvm(e)
    }
}

fn read_source(file: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(file).map_err(|e| CliError::Xvm(XvmError::Io(e)))
}

/// `Executable` itself only knows `to_bytes`/`from_bytes`; the file-system
/// read/write lives here, not in `xvm-core`.
fn write_executable(exe: &Executable, path: &Path) -> Result<(), CliError> {
    std::fs::write(path, exe.to_bytes()).map_err(|e| CliError::Xvm(XvmError::Io(e)))
}

fn read_executable(path: &Path) -> Result<Executable, CliError> {
    let bytes = std::fs::read(path).map_err(|e| CliError::Xvm(XvmError::Io(e)))?;
    Ok(Executable::from_bytes(&bytes)?)
}

fn filename_of(file: &Path) -> String {
    file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn compile(file: &Path, output: &Path, includes: &[PathBuf], config: &Config) -> Result<(), CliError> {
    let source = read_source(file)?;
    let mut resolver = DirIncludeResolver { dirs: includes.to_vec() };
    let exe = assembler::assemble_with_includes(&source, &filename_of(file), config, &mut resolver)?;
    if config.as_bool("disasm") || config.as_bool("fancy-disasm") {
        if let Some(section) = exe.section("code") {
            for line in xvm_core::isa::disassemble(&section.data) {
                tracing::info!("{line}");
            }
        }
    }
    write_executable(&exe, output)?;
    Ok(())
}

fn run(file: &Path, config: &Config) -> Result<(), CliError> {
    let exe = read_executable(file)?;
    execute(&exe, config)
}

fn runsrc(file: &Path, includes: &[PathBuf], config: &Config) -> Result<(), CliError> {
    let source = read_source(file)?;
    let mut resolver = DirIncludeResolver { dirs: includes.to_vec() };
    let exe = assembler::assemble_with_includes(&source, &filename_of(file), config, &mut resolver)?;
    execute(&exe, config)
}

fn execute(exe: &Executable, config: &Config) -> Result<(), CliError> {
    let ram_size = config.as_int("ram-size").max(0) as usize;
    let mut vm = Vm::new(ram_size);
    vm.debug = config.as_int("debug").max(0) as u32;
    syscalls::install(&mut vm);
    loader::load(&mut vm, exe, config)?;
    vm.run()?;
    Ok(())
}

fn dump(file: &Path) -> Result<(), CliError> {
    let exe = read_executable(file)?;
    println!(
        "magic=0x{:08x} version={} flags=0x{:x} sections={}",
        exe.magic,
        exe.version,
        exe.flags,
        exe.sections.len()
    );
    for section in &exe.sections {
        println!("-- {} ({:?}, {} bytes) --", section.label, section.kind, section.data.len());
        match section.kind {
            xvm_core::executable::SectionType::Code => {
                for line in xvm_core::isa::disassemble(&section.data) {
                    println!("  {line}");
                }
            }
            xvm_core::executable::SectionType::Symbols => {
                let table = SymbolTable::from_section(section)?;
                for sym in &table.symbols {
                    println!(
                        "  {:#06x} flags={:#x} size={} {}",
                        sym.address, sym.flags, sym.size, sym.label
                    );
                }
            }
            xvm_core::executable::SectionType::Relocations => {
                let table = RelocationTable::from_section(section)?;
                for entry in &table.relocations {
                    println!("  {} -> {} mention(s)", entry.label, entry.mentions.len());
                }
            }
            _ => {
                for chunk in section.data.chunks(16) {
                    let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                    println!("  {}", hex.join(" "));
                }
            }
        }
    }
    Ok(())
}

fn link(files: &[PathBuf], output: &Path, config: &Config) -> Result<(), CliError> {
    if files.is_empty() {
        return Err(CliError::Usage("link requires at least one object file".to_string()));
    }
    let mut objects = Vec::with_capacity(files.len());
    for file in files {
        objects.push(read_executable(file)?);
    }
    let linked = linker::link(&objects, config)?;
    write_executable(&linked, output)?;
    Ok(())
}
