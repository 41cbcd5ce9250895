use super::device::Device;
use super::error::Result;
use super::select::{self, OnlyUse};
use super::smi::DeviceSource;
use super::users::{self, SystemUsers, UserResolver};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use strum::Display;

/// What to report, picked from the command-line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Mode {
    /// Devices occupied by each user.
    #[strum(to_string = "who")]
    Who,
    /// The allowed device with the most free memory.
    #[strum(to_string = "sort-by-memory")]
    SortByMemory,
    /// Devices with no processes attached.
    #[strum(to_string = "free")]
    Free { randomize: bool, only_first: bool },
}

impl Mode {
    /// `who` wins over `sort_by_memory`, which wins over the free listing.
    pub fn from_flags(who: bool, sort_by_memory: bool, randomize: bool, only_first: bool) -> Self {
        if who {
            Mode::Who
        } else if sort_by_memory {
            Mode::SortByMemory
        } else {
            Mode::Free {
                randomize,
                only_first,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// User name to the indices of the devices they occupy.
    Users(BTreeMap<String, BTreeSet<u32>>),
    /// A single index, or nothing if no device qualified.
    First(Option<u32>),
    /// An ordered list of indices.
    Indices(Vec<u32>),
}

impl Report {
    pub fn users(devices: &[Device], resolver: &dyn UserResolver) -> Result<Self> {
        users::resolve_gpu_users(devices, resolver).map(Report::Users)
    }

    pub fn most_free_memory(devices: &[Device], only_use: Option<&OnlyUse>) -> Self {
        let ranked = select::restrict(select::rank_by_free_memory(devices), only_use);
        Report::First(ranked.first().copied())
    }

    pub fn free<R: Rng + ?Sized>(
        devices: &[Device],
        only_use: Option<&OnlyUse>,
        randomize: bool,
        only_first: bool,
        rng: &mut R,
    ) -> Self {
        let mut free = select::restrict(select::free_devices(devices), only_use);
        if randomize {
            select::shuffle(&mut free, rng);
        }
        if only_first {
            Report::First(free.first().copied())
        } else {
            Report::Indices(free)
        }
    }
}

/// Renders exactly what goes to stdout, trailing newline included.
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Users(users) => {
                for (user, indices) in users {
                    writeln!(f, "{} {}", user, join(indices.iter(), ","))?;
                }
                Ok(())
            }
            Report::First(Some(index)) => writeln!(f, "{index}"),
            Report::First(None) => writeln!(f),
            Report::Indices(indices) => writeln!(f, "{}", join(indices.iter(), " ")),
        }
    }
}

fn join<'a>(indices: impl Iterator<Item = &'a u32>, sep: &str) -> String {
    indices
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Enumerate devices once and build the report for `mode`.
pub fn run<R: Rng + ?Sized>(
    mode: Mode,
    source: &dyn DeviceSource,
    only_use: Option<&OnlyUse>,
    rng: &mut R,
) -> Result<Report> {
    let devices = source.devices()?;
    tracing::debug!(%mode, devices = devices.len(), "Building report");

    match mode {
        Mode::Who => {
            if only_use.is_some() {
                tracing::warn!("--only-use has no effect when reporting users");
            }
            let resolver = SystemUsers::for_pids(&users::occupying_pids(&devices));
            Report::users(&devices, &resolver)
        }
        Mode::SortByMemory => Ok(Report::most_free_memory(&devices, only_use)),
        Mode::Free {
            randomize,
            only_first,
        } => Ok(Report::free(&devices, only_use, randomize, only_first, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::fixtures::device;
    use crate::core::error::FreeGpusError;
    use crate::core::smi::fixtures::THREE_GPUS;
    use crate::core::smi::parse_devices;
    use crate::core::users::MockUserResolver;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture(Vec<Device>);

    impl DeviceSource for Fixture {
        fn devices(&self) -> Result<Vec<Device>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DeviceSource for Broken {
        fn devices(&self) -> Result<Vec<Device>> {
            Err(FreeGpusError::Parse("truncated".into()))
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    fn render(mode: Mode, devices: Vec<Device>, only_use: Option<&OnlyUse>) -> String {
        run(mode, &Fixture(devices), only_use, &mut rng())
            .unwrap()
            .to_string()
    }

    fn free(only_first: bool) -> Mode {
        Mode::Free {
            randomize: false,
            only_first,
        }
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(Mode::from_flags(true, true, true, true), Mode::Who);
        assert_eq!(Mode::from_flags(false, true, true, true), Mode::SortByMemory);
        assert_eq!(
            Mode::from_flags(false, false, true, false),
            Mode::Free {
                randomize: true,
                only_first: false
            }
        );
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Who.to_string(), "who");
        assert_eq!(Mode::SortByMemory.to_string(), "sort-by-memory");
        assert_eq!(free(true).to_string(), "free");
    }

    #[test]
    fn test_reports_from_nvidia_smi_output() {
        let devices = parse_devices(THREE_GPUS).unwrap();
        assert_eq!(render(free(false), devices.clone(), None), "0 2\n");
        assert_eq!(render(free(true), devices.clone(), None), "0\n");
        assert_eq!(render(Mode::SortByMemory, devices, None), "1\n");
    }

    #[test]
    fn test_free_report_restricted() {
        let devices = vec![device(0, 0, &[]), device(1, 0, &[9]), device(2, 0, &[])];
        let only_use: OnlyUse = [1, 2].into_iter().collect();
        assert_eq!(render(free(false), devices.clone(), Some(&only_use)), "2\n");
        assert_eq!(render(free(true), devices, Some(&only_use)), "2\n");
    }

    #[test]
    fn test_free_report_empty_prints_empty_line() {
        let busy = vec![device(0, 0, &[1]), device(1, 0, &[2])];
        assert_eq!(render(free(false), busy.clone(), None), "\n");
        assert_eq!(render(free(true), busy, None), "\n");
        assert_eq!(render(free(true), vec![], None), "\n");
    }

    #[test]
    fn test_free_report_randomized_keeps_members() {
        let devices: Vec<Device> = (0..8).map(|i| device(i, 0, &[])).collect();
        let report = Report::free(&devices, None, true, false, &mut rng());
        let Report::Indices(mut indices) = report else {
            panic!("expected an index list");
        };
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_memory_report_restricted() {
        let devices = vec![device(0, 0, &[]), device(1, 4096, &[1]), device(2, 2048, &[])];
        let only_use: OnlyUse = [0, 2].into_iter().collect();
        assert_eq!(render(Mode::SortByMemory, devices.clone(), Some(&only_use)), "2\n");

        let none: OnlyUse = [5].into_iter().collect();
        assert_eq!(render(Mode::SortByMemory, devices, Some(&none)), "\n");
    }

    #[test]
    fn test_memory_report_no_devices() {
        assert_eq!(render(Mode::SortByMemory, vec![], None), "\n");
    }

    #[test]
    fn test_users_report_format() {
        let devices = vec![device(0, 0, &[10]), device(1, 0, &[11, 20]), device(2, 0, &[])];
        let mut resolver = MockUserResolver::new();
        resolver.expect_username().returning(|pid| {
            Ok(match pid {
                20 => "bob".to_string(),
                _ => "alice".to_string(),
            })
        });

        let report = Report::users(&devices, &resolver).unwrap();
        assert_eq!(report.to_string(), "alice 0,1\nbob 1\n");
    }

    #[test]
    fn test_users_report_sorted_output() {
        let users = BTreeMap::from([
            ("zed".to_string(), BTreeSet::from([3, 1])),
            ("amy".to_string(), BTreeSet::from([10, 2])),
        ]);
        assert_eq!(Report::Users(users).to_string(), "amy 2,10\nzed 1,3\n");
    }

    #[test]
    fn test_users_report_nobody() {
        let devices = vec![device(0, 0, &[])];
        assert_eq!(render(Mode::Who, devices, None), "");
    }

    #[test]
    fn test_run_propagates_source_error() {
        let err = run(free(false), &Broken, None, &mut rng()).unwrap_err();
        assert!(matches!(err, FreeGpusError::Parse(_)));
    }
}
