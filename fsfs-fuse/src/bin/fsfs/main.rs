mod cli;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use fsfs::FileSystem;
use fsfs_fuse::{owner_ids, pack_dir, FsfsFuse};
use fuser::MountOption;
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command};

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Mount { file, mountpoint } => mount(&file, &mountpoint),
        Command::Pack { source, file } => pack(&source, &file),
        Command::Info { file } => info(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("fsfs: {err}");
            ExitCode::FAILURE
        }
    }
}

/// 调用者的`uid`与`gid`，新映像的根目录归其所有；超出 16 位则报错
fn caller() -> vfs::Result<(u16, u16)> {
    // SAFETY: getuid/getgid 总是成功，没有副作用
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    owner_ids(uid, gid).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("uid {uid} or gid {gid} does not fit in 16 bits"),
        )
        .into()
    })
}

fn mount(file: &Path, mountpoint: &Path) -> vfs::Result<()> {
    let (uid, gid) = caller()?;
    let fuse = FsfsFuse::open_or_create(file, uid, gid)?;

    let options = [
        MountOption::FSName("fsfs".to_owned()),
        MountOption::DefaultPermissions,
    ];
    fuser::mount2(fuse, mountpoint, &options)?;
    Ok(())
}

fn pack(source: &Path, file: &Path) -> vfs::Result<()> {
    let (uid, gid) = caller()?;
    let mut fs = FileSystem::create(uid, gid)?;

    let packed = pack_dir(source, &mut fs, uid, gid)?;
    fs.save(file)?;
    println!("packed {packed} files into {}", file.display());
    Ok(())
}

fn info(file: &Path) -> vfs::Result<()> {
    let stat = FileSystem::open(file)?.mount_stats();
    let block_size = stat.block_size as u64;
    let used_blocks = stat.blocks - stat.free_blocks;

    println!("image:  {}", file.display());
    println!(
        "blocks: {used_blocks}/{} used ({} of {})",
        stat.blocks,
        ByteSizeIec(used_blocks * block_size),
        ByteSizeIec(stat.blocks * block_size)
    );
    println!("inodes: {}/{} used", stat.files - stat.free_files, stat.files);
    Ok(())
}
