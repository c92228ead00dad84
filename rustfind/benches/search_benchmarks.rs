#![allow(unused_must_use)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rustfind::{FindConfig, Finder};
use std::{fs, fs::File, io::Write, path::Path};
use tempfile::tempdir;

fn create_test_tree(root: &Path, dirs: usize, files_per_dir: usize, lines_per_file: usize) -> std::io::Result<()> {
    for d in 0..dirs {
        let dir = root.join(format!("level_{}/dir_{}", d % 4, d));
        fs::create_dir_all(&dir)?;
        for f in 0..files_per_dir {
            let mut file = File::create(dir.join(format!("test_{}.txt", f)))?;
            for j in 0..lines_per_file {
                writeln!(
                    file,
                    "Line {} TODO: fix bug {} FIXME: optimize line {} NOTE: important task {}",
                    j, j, j, j
                )?;
            }
        }
    }
    Ok(())
}

fn create_base_config(root: &Path) -> FindConfig {
    FindConfig {
        names: vec!["*.txt".to_string()],
        base_dir: Some(root.to_path_buf()),
        unattended: true,
        progress: false,
        thread_count: Some(2),
        ..Default::default()
    }
}

fn bench_name_walk(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_test_tree(dir.path(), 200, 5, 1)?;
    let finder = Finder::new(create_base_config(dir.path())).unwrap();

    let mut group = c.benchmark_group("Name Walk");
    group.bench_function("dirs_200_files_1000", |b| {
        b.iter(|| black_box(finder.run(|output| drop(black_box(output))).unwrap()));
    });
    group.finish();
    Ok(())
}

fn bench_content_patterns(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_test_tree(dir.path(), 10, 10, 200)?;

    let patterns = vec![
        "TODO",
        r"TODO:.*\d+",
        r"FIXME:.*bug.*line \d+",
        r"NOTE:.*important.*\d+",
    ];

    let mut group = c.benchmark_group("Content Patterns");
    for (i, pattern) in patterns.iter().enumerate() {
        let mut config = create_base_config(dir.path());
        config.content.patterns = vec![pattern.to_string()];
        let finder = Finder::new(config).unwrap();

        group.bench_function(format!("pattern_{}", i), |b| {
            b.iter(|| black_box(finder.collect().unwrap()));
        });
    }
    group.finish();
    Ok(())
}

fn bench_thread_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    create_test_tree(dir.path(), 50, 10, 50)?;

    let mut group = c.benchmark_group("Thread Scaling");
    for threads in [1, 2, 4, 8] {
        let mut config = create_base_config(dir.path());
        config.thread_count = Some(threads);
        config.content.patterns = vec!["FIXME".to_string()];
        let finder = Finder::new(config).unwrap();

        group.bench_function(format!("threads_{}", threads), |b| {
            b.iter(|| black_box(finder.run(|output| drop(black_box(output))).unwrap()));
        });
    }
    group.finish();
    Ok(())
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_name_walk, bench_content_patterns, bench_thread_scaling
}

criterion_main!(benches);
