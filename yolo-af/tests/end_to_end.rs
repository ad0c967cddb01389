use anyhow::Result;
use approx::assert_abs_diff_eq;
use itertools::Itertools as _;
use rand::{prelude::*, rngs::StdRng};
use tch::{Device, Kind, Tensor};
use yolo_af::{
    BoxMetric, ConfigError, DenseOutput, DenseOutputUnchecked, GridSize, GroundTruth, LossError,
    Normalizer, SingleProcess, YoloLoss, YoloLossInit, YoloLossOutput,
};

fn build_loss(num_classes: usize) -> Result<YoloLoss> {
    Ok(YoloLossInit::new(num_classes, 32).build()?)
}

fn constant_output(
    batch_size: i64,
    grid: GridSize,
    num_classes: i64,
    bbox: [f32; 4],
) -> Result<DenseOutput> {
    let num_cells = grid.num_cells() as i64;
    let options = (Kind::Float, Device::Cpu);
    let output = DenseOutputUnchecked {
        obj_logit: Tensor::zeros(&[batch_size, num_cells], options).set_requires_grad(true),
        class_logit: Tensor::zeros(&[batch_size, num_cells, num_classes], options)
            .set_requires_grad(true),
        bbox: Tensor::of_slice(&bbox)
            .view([1, 1, 4])
            .repeat(&[batch_size, num_cells, 1])
            .set_requires_grad(true),
        grid,
    }
    .try_into()?;
    Ok(output)
}

fn random_output(
    rng: &mut StdRng,
    batch_size: usize,
    grid: GridSize,
    num_classes: usize,
) -> Result<DenseOutput> {
    let num_entries = batch_size * grid.num_cells();
    let batch_size = batch_size as i64;
    let num_cells = grid.num_cells() as i64;

    let obj: Vec<f32> = (0..num_entries).map(|_| rng.gen_range(-4.0..4.0)).collect();
    let class: Vec<f32> = (0..(num_entries * num_classes))
        .map(|_| rng.gen_range(-4.0..4.0))
        .collect();
    let bbox: Vec<f32> = (0..num_entries)
        .flat_map(|_| {
            let x1 = rng.gen_range(0.0..600.0);
            let y1 = rng.gen_range(0.0..600.0);
            let w = rng.gen_range(1.0..200.0);
            let h = rng.gen_range(1.0..200.0);
            [x1, y1, x1 + w, y1 + h]
        })
        .collect();

    let output = DenseOutputUnchecked {
        obj_logit: Tensor::of_slice(&obj)
            .reshape(&[batch_size, num_cells])
            .set_requires_grad(true),
        class_logit: Tensor::of_slice(&class)
            .reshape(&[batch_size, num_cells, num_classes as i64])
            .set_requires_grad(true),
        bbox: Tensor::of_slice(&bbox)
            .reshape(&[batch_size, num_cells, 4])
            .set_requires_grad(true),
        grid,
    }
    .try_into()?;
    Ok(output)
}

#[test]
fn single_box_scenario() -> Result<()> {
    let grid = GridSize::from_image_size(640, 640, 32)?;
    let loss_fn = build_loss(4)?;
    let output = constant_output(1, grid, 4, [0.0, 0.0, 10.0, 10.0])?;
    let gt = vec![vec![GroundTruth::new([100.0, 100.0, 200.0, 300.0], 2)?]];

    let (loss, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;

    assert_eq!(aux.num_positives, 1);
    assert_eq!(aux.num_foregrounds, 1.0);
    assert_eq!(aux.targets.num_positives(), &vec![1]);
    let objectness = Vec::<f32>::from(&aux.targets.objectness().view([-1]));
    let positives: Vec<_> = objectness
        .iter()
        .positions(|&value| value == 1.0)
        .collect();
    assert_eq!(positives, vec![6 * 20 + 4]);

    // zero logits cost ln(2) per entry
    let ln2 = 2f64.ln();
    let expect_obj = 400.0 * ln2;
    let expect_cls = 4.0 * ln2;
    // GIoU of (0, 0, 10, 10) and (100, 100, 200, 300)
    let expect_box = 1.0 + (60000.0 - 20100.0) / 60000.0;
    let expect_total = expect_obj + expect_cls + 5.0 * expect_box;

    assert_abs_diff_eq!(aux.breakdown.objectness, expect_obj, epsilon = 1e-3);
    assert_abs_diff_eq!(aux.breakdown.classification, expect_cls, epsilon = 1e-4);
    assert_abs_diff_eq!(aux.breakdown.bbox, expect_box, epsilon = 1e-4);
    assert_abs_diff_eq!(aux.breakdown.total, expect_total, epsilon = 1e-3);
    assert_abs_diff_eq!(f64::from(&loss.total_loss), expect_total, epsilon = 1e-3);

    // gradients reach every prediction head
    loss.total_loss.backward();
    for tensor in [output.obj_logit(), output.class_logit(), output.bbox()] {
        let grad = tensor.grad();
        assert!(bool::from(grad.isfinite().all()));
        assert!(f64::from(grad.abs().sum(Kind::Float)) > 0.0);
    }
    Ok(())
}

#[test]
fn zero_ground_truth() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let grid = GridSize::new(6, 5)?;
    let loss_fn = build_loss(3)?;
    let output = random_output(&mut rng, 2, grid, 3)?;
    let gt: Vec<Vec<GroundTruth>> = vec![vec![], vec![]];

    let (loss, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;

    assert_eq!(aux.num_positives, 0);
    assert_eq!(aux.num_foregrounds, 1.0);
    assert_eq!(aux.breakdown.classification, 0.0);
    assert_eq!(aux.breakdown.bbox, 0.0);
    assert!(aux.breakdown.objectness > 0.0);
    assert!(aux.breakdown.total.is_finite());

    // every location is a negative
    let expect_obj = f64::from(
        output
            .obj_logit()
            .binary_cross_entropy_with_logits::<&Tensor>(
                &output.obj_logit().zeros_like(),
                None,
                None,
                tch::Reduction::Sum,
            ),
    );
    assert_abs_diff_eq!(aux.breakdown.objectness, expect_obj, epsilon = 1e-4);

    loss.total_loss.backward();
    assert!(bool::from(output.obj_logit().grad().isfinite().all()));
    Ok(())
}

#[test]
fn perfect_prediction() -> Result<()> {
    let grid = GridSize::new(10, 10)?;
    let loss_fn = build_loss(3)?;
    let gt = vec![
        vec![
            GroundTruth::new([10.0, 20.0, 60.0, 50.0], 0)?,
            GroundTruth::new([200.0, 150.0, 310.0, 290.0], 2)?,
        ],
        vec![GroundTruth::new([0.0, 0.0, 320.0, 320.0], 1)?],
    ];

    let targets = loss_fn.assigner().assign_batch(grid, &gt)?;
    let output: DenseOutput = DenseOutputUnchecked {
        obj_logit: targets.objectness() * 40.0 - 20.0,
        class_logit: targets.class() * 40.0 - 20.0,
        bbox: targets.bbox().shallow_clone(),
        grid,
    }
    .try_into()?;

    let (_, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;
    assert_eq!(aux.num_positives, 3);
    assert_abs_diff_eq!(aux.breakdown.objectness, 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(aux.breakdown.classification, 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(aux.breakdown.bbox, 0.0, epsilon = 1e-5);
    assert_abs_diff_eq!(aux.breakdown.total, 0.0, epsilon = 1e-4);
    Ok(())
}

#[test]
fn reversed_box_prediction() -> Result<()> {
    let grid = GridSize::from_image_size(640, 640, 32)?;
    let loss_fn = build_loss(4)?;
    let gt = vec![vec![GroundTruth::new([100.0, 100.0, 200.0, 300.0], 2)?]];

    // the target box with both corner pairs swapped
    let output = constant_output(1, grid, 4, [200.0, 300.0, 100.0, 100.0])?;
    let (_, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;
    assert_abs_diff_eq!(aux.breakdown.bbox, 0.0, epsilon = 1e-5);

    // x2 < x1 only, taken as (0, 0, 20, 10) against (100, 100, 200, 300)
    let output = constant_output(1, grid, 4, [20.0, 0.0, 0.0, 10.0])?;
    let (loss, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;
    let expect_box = 1.0 + (60000.0 - 20200.0) / 60000.0;
    assert_abs_diff_eq!(aux.breakdown.bbox, expect_box, epsilon = 1e-4);
    assert!(aux.breakdown.bbox >= 0.0 && aux.breakdown.bbox < 2.0);

    loss.total_loss.backward();
    let grad = output.bbox().grad();
    assert!(bool::from(grad.isfinite().all()));
    assert!(f64::from(grad.abs().sum(Kind::Float)) > 0.0);
    Ok(())
}

#[test]
fn weights_combine_task_losses() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2);
    let grid = GridSize::new(8, 8)?;
    let gt = vec![
        vec![GroundTruth::new([30.0, 40.0, 90.0, 120.0], 1)?],
        vec![
            GroundTruth::new([100.0, 10.0, 140.0, 60.0], 0)?,
            GroundTruth::new([150.0, 150.0, 250.0, 250.0], 1)?,
        ],
    ];
    let output = random_output(&mut rng, 2, grid, 2)?;

    let loss_fn = YoloLossInit {
        objectness_loss_weight: Some(0.3),
        classification_loss_weight: Some(1.7),
        box_loss_weight: Some(2.5),
        ..YoloLossInit::new(2, 32)
    }
    .build()?;
    let (loss, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;
    let breakdown = aux.breakdown;

    assert_eq!(aux.num_foregrounds, 3.0);
    assert_abs_diff_eq!(
        breakdown.total,
        0.3 * breakdown.objectness + 1.7 * breakdown.classification + 2.5 * breakdown.bbox,
        epsilon = 1e-4
    );
    assert_abs_diff_eq!(
        f64::from(&loss.objectness_loss),
        breakdown.objectness,
        epsilon = 1e-6
    );

    // the box term is bounded by 2 per positive before normalization
    assert!(breakdown.bbox >= 0.0 && breakdown.bbox < 2.0);
    Ok(())
}

#[test]
fn loss_is_deterministic() -> Result<()> {
    let grid = GridSize::new(5, 5)?;
    let loss_fn = build_loss(2)?;
    let gt = vec![vec![
        GroundTruth::new([10.0, 10.0, 40.0, 40.0], 0)?,
        GroundTruth::new([12.0, 12.0, 44.0, 30.0], 1)?,
        GroundTruth::new([90.0, 70.0, 150.0, 140.0], 1)?,
    ]];

    let compute = || -> Result<_> {
        let mut rng = StdRng::seed_from_u64(3);
        let output = random_output(&mut rng, 1, grid, 2)?;
        let (_, aux) = loss_fn.forward(&output, &gt, &Normalizer::new(SingleProcess))?;
        Ok(aux.breakdown)
    };

    let first = compute()?;
    for _ in 0..5 {
        assert_eq!(compute()?, first);
    }
    Ok(())
}

#[test]
fn non_finite_prediction_fails() -> Result<()> {
    let grid = GridSize::new(4, 4)?;
    let loss_fn = build_loss(2)?;
    let gt = vec![vec![GroundTruth::new([10.0, 10.0, 40.0, 40.0], 0)?]];

    let output = constant_output(1, grid, 2, [0.0, 0.0, 10.0, 10.0])?;
    let obj_logit = output.obj_logit().detach().fill_(f64::NAN);
    let output: DenseOutput = DenseOutputUnchecked {
        obj_logit,
        ..DenseOutputUnchecked::from(output)
    }
    .try_into()?;

    let err = loss_fn
        .forward(&output, &gt, &Normalizer::new(SingleProcess))
        .unwrap_err();
    match err.downcast_ref::<LossError>() {
        Some(LossError::NonFinite { breakdown }) => {
            assert!(breakdown.objectness.is_nan());
            assert!(breakdown.total.is_nan());
        }
        None => panic!("expect a non-finite loss error, but get {:?}", err),
    }
    Ok(())
}

#[test]
fn mismatched_inputs_fail() -> Result<()> {
    let grid = GridSize::new(4, 4)?;
    let loss_fn = build_loss(3)?;

    // class axis does not agree with the configuration
    let output = constant_output(1, grid, 2, [0.0, 0.0, 10.0, 10.0])?;
    let gt = vec![vec![GroundTruth::new([10.0, 10.0, 40.0, 40.0], 0)?]];
    assert!(loss_fn
        .forward(&output, &gt, &Normalizer::new(SingleProcess))
        .is_err());

    // batch size does not agree with the ground truth lists
    let output = constant_output(2, grid, 3, [0.0, 0.0, 10.0, 10.0])?;
    assert!(loss_fn
        .forward(&output, &gt, &Normalizer::new(SingleProcess))
        .is_err());

    // class label out of range
    let output = constant_output(1, grid, 3, [0.0, 0.0, 10.0, 10.0])?;
    let gt = vec![vec![GroundTruth::new([10.0, 10.0, 40.0, 40.0], 3)?]];
    let err = loss_fn
        .forward(&output, &gt, &Normalizer::new(SingleProcess))
        .unwrap_err();
    assert!(err
        .chain()
        .any(|cause| cause.is::<yolo_af::AssignError>()));
    Ok(())
}

#[test]
fn config_errors() {
    let iou = YoloLossInit {
        box_metric: Some(BoxMetric::IoU),
        ..YoloLossInit::new(3, 32)
    };
    assert_eq!(
        iou.build().unwrap_err(),
        ConfigError::UnsupportedBoxMetric(BoxMetric::IoU)
    );

    assert_eq!(
        YoloLossInit::new(3, 0).build().unwrap_err(),
        ConfigError::ZeroStride
    );

    let nan_weight = YoloLossInit {
        classification_loss_weight: Some(f64::NAN),
        ..YoloLossInit::new(3, 32)
    };
    assert!(matches!(
        nan_weight.build(),
        Err(ConfigError::InvalidWeight {
            name: "classification_loss_weight",
            ..
        })
    ));
}

#[test]
fn weighted_mean_of_minibatches() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(4);
    let grid = GridSize::new(4, 4)?;
    let loss_fn = build_loss(2)?;
    let gt = vec![
        vec![GroundTruth::new([10.0, 10.0, 40.0, 40.0], 0)?],
        vec![GroundTruth::new([60.0, 70.0, 100.0, 120.0], 1)?],
    ];

    let (first, first_aux) = loss_fn.forward(
        &random_output(&mut rng, 1, grid, 2)?,
        &gt[0..1],
        &Normalizer::new(SingleProcess),
    )?;
    let (second, second_aux) = loss_fn.forward(
        &random_output(&mut rng, 1, grid, 2)?,
        &gt[1..2],
        &Normalizer::new(SingleProcess),
    )?;

    let mean = YoloLossOutput::weighted_mean([(&first, 1.0), (&second, 3.0)])?;
    let expect = (first_aux.breakdown.total + 3.0 * second_aux.breakdown.total) / 4.0;
    assert_abs_diff_eq!(f64::from(&mean.total_loss), expect, epsilon = 1e-4);

    assert!(YoloLossOutput::weighted_mean(Vec::<(&YoloLossOutput, f64)>::new()).is_err());
    Ok(())
}
