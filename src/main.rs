use clap::{Arg, ArgMatches, Command};
use tracing::{error, info};

use fdcsim::logging::{ensure_log_directory, init_logging, parse_log_level, LogConfig, LogOutput};
use fdcsim::scenario::ScenarioConfig;
use fdcsim::simulation::SimulationEngine;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("fdcsim")
        .version("0.1.0")
        .about("射撃指揮所シミュレーション (Fire Direction Center Simulation)")
        .long_about("火砲中隊の射撃諸元計算と射撃任務管理を行う訓練用シミュレーター\n\
                     シナリオに記述された射撃要求・修正・中止を時間駆動で再生します。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 射撃号令を表示, -vv: 設定も表示)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .default_value("logs")
                .help("ログファイルの出力ディレクトリ")
        )
        .get_matches();

    let log_config = match build_log_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = ensure_log_directory(&log_config) {
        eprintln!("エラー: ログディレクトリを作成できません: {}", e);
        std::process::exit(1);
    }

    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    println!("射撃指揮所シミュレーション - fdcsim v0.1.0");
    println!();

    let verbose_level = matches.get_count("verbose");

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        if let Err(e) = run_scenario(scenario_path, matches.get_flag("info"), verbose_level) {
            error!(error = %e, "シナリオ実行に失敗しました");
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    } else {
        show_default_help();
    }
}

/// コマンドライン引数からログ設定を作成
fn build_log_config(matches: &ArgMatches) -> Result<LogConfig, String> {
    let mut config = LogConfig::default();
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.level = parse_log_level(level)?;
    }
    if let Some(output) = matches.get_one::<String>("log-output") {
        config.output = output.parse::<LogOutput>()?;
    }
    if let Some(dir) = matches.get_one::<String>("log-dir") {
        config.log_dir = dir.clone();
    }
    Ok(config)
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, info_only: bool, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;
    info!(path = scenario_path, name = %scenario.meta.name, "シナリオを読み込みました");

    scenario.print_summary();
    println!();
    if info_only {
        return Ok(());
    }

    if verbose_level > 1 {
        println!("シミュレーション設定:");
        println!("  時間刻み: {:.3}秒", scenario.sim.dt_s);
        println!("  最大時間: {:.1}秒", scenario.sim.t_max_s);
        println!("  横風係数: {:.3} mil/kt/km", scenario.correction.crosswind_mils_per_knot_per_km);
        println!();
    }

    let mut simulation = SimulationEngine::new(scenario, verbose_level)?;
    let summary = simulation.run()?;
    summary.print();

    Ok(())
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  fdcsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL> ログレベル");
    println!("      --log-output <OUT>  ログ出力先 (console, file, both)");
    println!("      --log-dir <DIR>     ログ出力ディレクトリ");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/basic_fire_mission.yaml  - 2個中隊による基本射撃任務");
    println!();
    println!("例:");
    println!("  fdcsim -s scenarios/basic_fire_mission.yaml");
    println!("  fdcsim -s scenarios/basic_fire_mission.yaml -v --log-output both");
    println!("  fdcsim -s scenarios/basic_fire_mission.yaml -i");
}
