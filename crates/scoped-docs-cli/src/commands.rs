//! Command-line parsing and the one-shot commands

use anyhow::{Context, Result, bail};
use relative_path::{Component, RelativePath};
use scoped_docs_engine::VirtualFileHandle;
use std::io::{Read, Write};

const COMMANDS: [&str; 8] = ["ls", "cat", "put", "cp", "mv", "rm", "empty", "grant"];

/// Where the document tree comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
    /// The tree granted earlier and saved in the config file
    Config,
    Directory(String),
    /// A throwaway in-memory tree with some sample content
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Browse,
    List(String),
    Cat(String),
    Put { path: String, append: bool },
    Copy { from: String, to: String },
    Move { from: String, to: String },
    Remove(String),
    Empty { path: String, preserve_tree: bool },
    Grant(String),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub source: TreeSource,
    pub command: Command,
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--memory | --root <dir>] [command]\n\
         \n\
         Without a command, browse the tree. Commands take paths relative to the tree root:\n\
         \x20 ls [path]                  list a directory\n\
         \x20 cat <path>                 print a file\n\
         \x20 put [--append] <path>      write stdin to a file, creating it if needed\n\
         \x20 cp <from> <to>             copy a file or directory\n\
         \x20 mv <from> <to>             move a file or directory\n\
         \x20 rm <path>                  delete a file or directory\n\
         \x20 empty [--keep-dirs] <path> delete the contents of a directory\n\
         \x20 grant <dir>                remember <dir> as the tree to use"
    )
}

/// Parse everything after the program name
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut source = TreeSource::Config;
    let mut rest = args;
    loop {
        match rest {
            [flag, tail @ ..] if flag == "--memory" => {
                source = TreeSource::Memory;
                rest = tail;
            }
            [flag, dir, tail @ ..] if flag == "--root" => {
                source = TreeSource::Directory(dir.clone());
                rest = tail;
            }
            [flag] if flag == "--root" => bail!("--root needs a directory"),
            _ => break,
        }
    }

    let words: Vec<&str> = rest.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        [] => Command::Browse,
        ["ls"] => Command::List(String::new()),
        ["ls", path] => Command::List(path.to_string()),
        ["cat", path] => Command::Cat(path.to_string()),
        ["put", path] => Command::Put {
            path: path.to_string(),
            append: false,
        },
        ["put", "--append", path] | ["put", path, "--append"] => Command::Put {
            path: path.to_string(),
            append: true,
        },
        ["cp", from, to] => Command::Copy {
            from: from.to_string(),
            to: to.to_string(),
        },
        ["mv", from, to] => Command::Move {
            from: from.to_string(),
            to: to.to_string(),
        },
        ["rm", path] => Command::Remove(path.to_string()),
        ["empty", path] => Command::Empty {
            path: path.to_string(),
            preserve_tree: false,
        },
        ["empty", "--keep-dirs", path] | ["empty", path, "--keep-dirs"] => Command::Empty {
            path: path.to_string(),
            preserve_tree: true,
        },
        ["grant", dir] => Command::Grant(dir.to_string()),
        // Plain `scoped-docs-cli <dir>` browses that directory
        [dir] if !COMMANDS.contains(dir) && source == TreeSource::Config => {
            source = TreeSource::Directory(dir.to_string());
            Command::Browse
        }
        [word, ..] => bail!("Unknown or incomplete command: {word}"),
    };

    Ok(Invocation { source, command })
}

/// Handle for a `/`-separated path below `root`
pub fn walk(root: &VirtualFileHandle, relative: &str) -> Result<VirtualFileHandle> {
    let mut handle = root.clone();
    for component in RelativePath::new(relative).components() {
        match component {
            Component::Normal(name) => {
                handle = handle
                    .child(name)
                    .with_context(|| format!("Cannot open {relative}"))?;
            }
            Component::CurDir => {}
            Component::ParentDir => bail!("{relative}: paths may not leave the tree"),
        }
    }
    Ok(handle)
}

pub fn run(
    command: Command,
    root: &VirtualFileHandle,
    output: &mut dyn Write,
    input: &mut dyn Read,
) -> Result<()> {
    match command {
        Command::List(path) => {
            let dir = walk(root, &path)?;
            if !dir.is_directory() {
                bail!("{path} is not a directory");
            }
            for entry in dir.list()? {
                writeln!(output, "{}", describe(&entry)?)?;
            }
        }
        Command::Cat(path) => {
            let bytes = walk(root, &path)?.read_bytes()?;
            output.write_all(&bytes)?;
        }
        Command::Put { path, append } => {
            let mut bytes = Vec::new();
            input.read_to_end(&mut bytes)?;
            let mut target = walk(root, &path)?;
            target.write_bytes(&bytes, append)?;
            log::info!("Wrote {} bytes to {}", bytes.len(), target.path());
        }
        Command::Copy { from, to } => {
            let source = walk(root, &from)?;
            let mut destination = walk(root, &to)?;
            source
                .copy_to(&mut destination)
                .with_context(|| format!("Cannot copy {from} to {to}"))?;
        }
        Command::Move { from, to } => {
            let source = walk(root, &from)?;
            let mut destination = walk(root, &to)?;
            source
                .move_to(&mut destination)
                .with_context(|| format!("Cannot move {from} to {to}"))?;
        }
        Command::Remove(path) => {
            if !walk(root, &path)?.delete()? {
                bail!("{path} does not exist");
            }
        }
        Command::Empty {
            path,
            preserve_tree,
        } => walk(root, &path)?.empty_directory(preserve_tree)?,
        Command::Browse | Command::Grant(_) => bail!("{command:?} is not a one-shot command"),
    }
    Ok(())
}

fn describe(entry: &VirtualFileHandle) -> Result<String> {
    let name = entry.name()?;
    Ok(if entry.is_directory() {
        format!("{name}/")
    } else {
        format!("{name}\t{}", entry.length()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use scoped_docs_engine::provider::MemoryProvider;
    use std::sync::Arc;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn tree() -> (MemoryProvider, VirtualFileHandle) {
        let provider = MemoryProvider::new("Demo");
        provider.add_file("saves/slot1.dat", "level=3").unwrap();
        provider.add_file("notes.md", "# Notes\n").unwrap();
        let root = VirtualFileHandle::bound(Arc::new(provider.clone()), provider.root());
        (provider, root)
    }

    fn run_capture(line: &str, root: &VirtualFileHandle, stdin: &str) -> Result<String> {
        let invocation = parse_args(&args(line))?;
        let mut output = Vec::new();
        run(invocation.command, root, &mut output, &mut stdin.as_bytes())?;
        Ok(String::from_utf8(output)?)
    }

    #[rstest]
    #[case("", TreeSource::Config, Command::Browse)]
    #[case("/tmp/games", TreeSource::Directory("/tmp/games".into()), Command::Browse)]
    #[case("--memory ls", TreeSource::Memory, Command::List(String::new()))]
    #[case(
        "--root /tmp/games cat a.txt",
        TreeSource::Directory("/tmp/games".into()),
        Command::Cat("a.txt".into())
    )]
    #[case(
        "put --append log.txt",
        TreeSource::Config,
        Command::Put { path: "log.txt".into(), append: true }
    )]
    #[case(
        "empty cache --keep-dirs",
        TreeSource::Config,
        Command::Empty { path: "cache".into(), preserve_tree: true }
    )]
    #[case("grant ~/games", TreeSource::Config, Command::Grant("~/games".into()))]
    fn test_parse_args(#[case] line: &str, #[case] source: TreeSource, #[case] command: Command) {
        let invocation = parse_args(&args(line)).unwrap();
        assert_eq!(invocation, Invocation { source, command });
    }

    #[rstest]
    #[case("cp only-one")]
    #[case("frobnicate a b")]
    #[case("--root")]
    fn test_parse_args_rejects(#[case] line: &str) {
        assert!(parse_args(&args(line)).is_err());
    }

    #[test]
    fn test_ls() {
        let (_provider, root) = tree();

        let listing = run_capture("ls", &root, "").unwrap();

        assert_eq!(listing, "notes.md\t8\nsaves/\n");
        assert!(run_capture("ls notes.md", &root, "").is_err());
    }

    #[test]
    fn test_cat_and_put() {
        let (provider, root) = tree();

        run_capture("put saves/slot2.dat", &root, "level=9").unwrap();
        run_capture("put --append saves/slot2.dat", &root, "!").unwrap();

        assert_eq!(provider.contents("saves/slot2.dat").unwrap(), b"level=9!");
        assert_eq!(run_capture("cat saves/slot2.dat", &root, "").unwrap(), "level=9!");
    }

    #[test]
    fn test_cp_mv_rm() {
        let (provider, root) = tree();

        run_capture("cp saves backup", &root, "").unwrap();
        assert_eq!(provider.contents("backup/slot1.dat").unwrap(), b"level=3");

        run_capture("mv notes.md backup/notes.md", &root, "").unwrap();
        assert_eq!(provider.child_names(""), vec!["backup", "saves"]);

        run_capture("rm saves", &root, "").unwrap();
        assert_eq!(provider.child_names(""), vec!["backup"]);
        assert!(run_capture("rm saves", &root, "").is_err());
    }

    #[test]
    fn test_empty_keeping_dirs() {
        let (provider, root) = tree();
        provider.add_file("saves/old/slot0.dat", "x").unwrap();

        run_capture("empty --keep-dirs saves", &root, "").unwrap();

        assert_eq!(provider.child_names("saves"), vec!["old"]);
        assert!(provider.child_names("saves/old").is_empty());
    }

    #[test]
    fn test_walk_refuses_to_leave_tree() {
        let (_provider, root) = tree();

        assert!(walk(&root, "../elsewhere").is_err());
        assert_eq!(walk(&root, "./saves/slot1.dat").unwrap().name().unwrap(), "slot1.dat");
    }
}
