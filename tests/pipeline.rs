use sinoflow::prelude::*;
use sinoflow::task::drive;
use sinoflow::tasks::reduce::{ReduceMode, ReduceTask};
use sinoflow::tasks::rofex::dummy_ram::DummyRamTask;
use sinoflow::tasks::rofex::fan2para::Fan2ParaTask;
use sinoflow::tasks::rofex::group_slices::GroupSlicesTask;
use sinoflow::tasks::rofex::make_sinogram::MakeSinogramTask;
use sinoflow::tasks::rofex::slice::SliceTask;

const N_MODULES: usize = 2;
const N_DET_PM: usize = 2;
const N_PROJ: usize = 3;
const N_PLANES: usize = 2;

fn chunk_value(module: usize, plane: usize, proj: usize, det: usize) -> f32 {
    return (1000 * module + 100 * plane + 10 * proj + det) as f32;
}

/// One module's raw projections for one plane
fn acquisition_chunk(module: usize, plane: usize) -> Buffer {
    let mut data = Vec::with_capacity(N_DET_PM * N_PROJ);
    for proj in 0..N_PROJ {
        for det in 0..N_DET_PM {
            data.push(chunk_value(module, plane, proj, det));
        }
    }
    return Buffer::from_vec(Requisition::new_2d(N_DET_PM, N_PROJ), data);
}

/// The full-ring sinogram expected for one plane after assembly
fn expected_plane_sinogram(plane: usize) -> Vec<f32> {
    let mut data = Vec::new();
    for proj in 0..N_PROJ {
        for module in 0..N_MODULES {
            for det in 0..N_DET_PM {
                data.push(chunk_value(module, plane, proj, det));
            }
        }
    }
    return data;
}

fn identity_table(n_dets: usize, n_proj: usize) -> Buffer {
    let mut table = Vec::with_capacity(2 * n_dets * n_proj);
    for proj in 0..n_proj {
        for det in 0..n_dets {
            table.push(det as f32);
            table.push(proj as f32);
        }
    }
    return Buffer::from_vec(Requisition::new_2d(2 * n_dets, n_proj), table);
}

fn into_sets(buffers: Vec<Buffer>) -> Vec<Vec<Buffer>> {
    return buffers.into_iter().map(|buffer| vec![buffer]).collect();
}

#[test]
fn acquisition_chain_reassembles_per_plane_sinograms() {
    let resources = Resources::new(-1);

    // raw chunks arrive module-major, then plane-major
    let mut chunks = Vec::new();
    for plane in 0..N_PLANES {
        for module in 0..N_MODULES {
            chunks.push(vec![acquisition_chunk(module, plane)]);
        }
    }

    // buffer the stream in the emulated detector RAM
    let mut ram = DummyRamTask::new(N_MODULES, N_PLANES, 1, false).unwrap();
    let dumps = drive(&mut ram, &resources, &chunks).unwrap();
    assert_eq!(dumps.len(), N_MODULES);

    // stitch the module dumps into one sinogram stack
    let mut assemble = MakeSinogramTask::new(N_MODULES, N_DET_PM, N_PROJ, N_PLANES).unwrap();
    let stacks = drive(&mut assemble, &resources, &into_sets(dumps)).unwrap();
    assert_eq!(stacks.len(), 1);
    assert_eq!(
        stacks[0].requisition().dims(),
        &[N_MODULES * N_DET_PM, N_PROJ, N_PLANES]
    );

    // split the stack into plane-tagged sinograms
    let mut split = SliceTask::new(N_PLANES).unwrap();
    let slices = drive(&mut split, &resources, &into_sets(stacks)).unwrap();
    assert_eq!(slices.len(), N_PLANES);

    // resample through an identity gather table; payload must survive
    let table = identity_table(N_MODULES * N_DET_PM, N_PROJ);
    let mut resample = Fan2ParaTask::new(N_PLANES, N_MODULES * N_DET_PM, N_PROJ).unwrap();
    let resampled_sets: Vec<Vec<Buffer>> = slices
        .into_iter()
        .map(|slice| vec![slice, table.dup()])
        .collect();
    let resampled = drive(&mut resample, &resources, &resampled_sets).unwrap();
    assert_eq!(resampled.len(), N_PLANES);

    // regroup by plane
    let mut group = GroupSlicesTask::new(1, N_PLANES).unwrap();
    let grouped = drive(&mut group, &resources, &into_sets(resampled)).unwrap();
    assert_eq!(grouped.len(), N_PLANES);

    for (plane, stack) in grouped.iter().enumerate() {
        assert_eq!(stack.plane_index(), Some(plane as u32));
        assert_eq!(stack.host(), &expected_plane_sinogram(plane)[..]);
    }
}

#[test]
fn reduction_rides_along_the_stream() {
    let resources = Resources::new(-1);

    let mut sets = Vec::new();
    for plane in 0..N_PLANES {
        let data = expected_plane_sinogram(plane);
        let mut sino = Buffer::from_vec(
            Requisition::new_2d(N_MODULES * N_DET_PM, N_PROJ),
            data,
        );
        sino.set_plane_index(Some(plane as u32));
        sets.push(vec![sino]);
    }

    let mut reduce = ReduceTask::new(ReduceMode::Sum);
    let outputs = drive(&mut reduce, &resources, &sets).unwrap();
    assert_eq!(outputs.len(), N_PLANES);

    for (plane, output) in outputs.iter().enumerate() {
        let expected: f32 = expected_plane_sinogram(plane).iter().sum();
        let tag = output.scalar().unwrap();

        assert_eq!(tag.label, "sum");
        assert_eq!(tag.value, expected);

        // the payload and its plane tag pass through untouched
        assert_eq!(output.plane_index(), Some(plane as u32));
        assert_eq!(output.host(), &expected_plane_sinogram(plane)[..]);
    }
}

#[test]
fn slice_and_group_are_inverse_in_lockstep() {
    let resources = Resources::new(0);

    let depth = 6; // 3 frames x 2 planes
    let data: Vec<f32> = (0..4 * depth).map(|i| i as f32).collect();
    let stack = Buffer::from_vec(Requisition::new_3d(2, 2, depth), data.clone());

    let mut split = SliceTask::new(N_PLANES).unwrap();
    let slices = drive(&mut split, &resources, &[vec![stack]]).unwrap();
    assert_eq!(slices.len(), depth);

    let mut group = GroupSlicesTask::new(3, N_PLANES).unwrap();
    let grouped = drive(&mut group, &resources, &into_sets(slices)).unwrap();
    assert_eq!(grouped.len(), N_PLANES);

    // plane p's stack holds the original slices p, p+2, p+4
    for (plane, stack) in grouped.iter().enumerate() {
        for frame in 0..3 {
            let original = (frame * N_PLANES + plane) * 4;
            assert_eq!(
                &stack.host()[frame * 4..(frame + 1) * 4],
                &data[original..original + 4]
            );
        }
    }
}
